//! Image and audio handlers: downscale an image, transcribe a recording.

use std::io::Cursor;
use std::path::PathBuf;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tracing::debug;

use super::markdown::pipe_through;
use super::write_output;
use crate::skills::{Action, Handler, HandlerContext, ParamKind, ParamSpec};

const DEFAULT_SCALE_PERCENT: u32 = 50;

// ── compress_image ────────────────────────────────────────

/// Shrinks an image by a percentage of its width and height.
pub struct CompressImageHandler;

#[derive(Debug, Deserialize)]
pub struct CompressImageParams {
    input_file: PathBuf,
    output_file: PathBuf,
    #[serde(deserialize_with = "de_percent")]
    scale_percent: u32,
}

fn de_percent<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let percent = u32::deserialize(deserializer)?;
    if (1..=100).contains(&percent) {
        Ok(percent)
    } else {
        Err(serde::de::Error::custom(format!(
            "scale_percent must be between 1 and 100 (got {percent})"
        )))
    }
}

/// Resizes to `percent` of each dimension, never below one pixel, and
/// encodes in `format`. Returns the new size and the encoded bytes.
fn shrink(bytes: &[u8], percent: u32, format: ImageFormat) -> anyhow::Result<((u32, u32), Vec<u8>)> {
    let original = image::load_from_memory(bytes).context("cannot decode image")?;
    let scale = |side: u32| ((u64::from(side) * u64::from(percent)) / 100).max(1) as u32;
    let (width, height) = (scale(original.width()), scale(original.height()));
    let resized = original.resize_exact(width, height, FilterType::Triangle);
    // JPEG has no alpha channel
    let resized = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        _ => resized,
    };

    let mut encoded = Cursor::new(Vec::new());
    resized
        .write_to(&mut encoded, format)
        .context("cannot encode image")?;
    Ok(((width, height), encoded.into_inner()))
}

#[async_trait]
impl Handler for CompressImageHandler {
    type Params = CompressImageParams;

    fn action(&self) -> Action {
        Action::CompressImage
    }

    fn description(&self) -> &'static str {
        "Shrink an image to `scale_percent` of its size; the output format follows the output file extension."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input_file", ParamKind::Path),
            ParamSpec::required("output_file", ParamKind::Path),
            ParamSpec::optional("scale_percent", ParamKind::Integer, json!(DEFAULT_SCALE_PERCENT)),
        ]
    }

    async fn run(&self, params: CompressImageParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let shown = ctx.gate.display(&params.output_file);
        let format = ImageFormat::from_path(&params.output_file)
            .map_err(|_| anyhow!("cannot tell the image format of {shown} from its extension"))?;
        let bytes = tokio::fs::read(&params.input_file)
            .await
            .with_context(|| format!("cannot read {}", ctx.gate.display(&params.input_file)))?;
        let before = bytes.len();

        let percent = params.scale_percent;
        let ((width, height), encoded) =
            tokio::task::spawn_blocking(move || shrink(&bytes, percent, format)).await??;
        debug!("Image encoded as {format:?}: {before} → {} bytes", encoded.len());

        write_output(&params.output_file, &encoded, ctx).await?;
        Ok(format!(
            "Image resized to {width}x{height} ({} bytes) in {shown}",
            encoded.len()
        ))
    }
}

// ── transcribe_audio ──────────────────────────────────────

/// Transcribes an audio file with the configured speech-to-text command.
pub struct TranscribeAudioHandler;

#[derive(Debug, Deserialize)]
pub struct TranscribeAudioParams {
    input_file: PathBuf,
    output_file: PathBuf,
}

#[async_trait]
impl Handler for TranscribeAudioHandler {
    type Params = TranscribeAudioParams;

    fn action(&self) -> Action {
        Action::TranscribeAudio
    }

    fn description(&self) -> &'static str {
        "Transcribe speech in an audio file and write the text."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input_file", ParamKind::Path),
            ParamSpec::required("output_file", ParamKind::Path),
        ]
    }

    async fn run(&self, params: TranscribeAudioParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let input = ctx.gate.display(&params.input_file);
        let metadata = tokio::fs::metadata(&params.input_file)
            .await
            .with_context(|| format!("cannot read {input}"))?;
        if !metadata.is_file() {
            anyhow::bail!("{input} is not a regular file");
        }

        let mut command = ctx.tools.transcriber.clone();
        command.push(params.input_file.to_string_lossy().into_owned());
        let stdout = pipe_through(&command, Vec::new())
            .await
            .context("transcription failed")?;
        let transcript = String::from_utf8_lossy(&stdout);
        let transcript = transcript.trim();
        if transcript.is_empty() {
            anyhow::bail!("no speech recognized in {input}");
        }

        write_output(&params.output_file, transcript, ctx).await?;
        Ok(format!(
            "Transcript of {input} ({} words) written to {}",
            transcript.split_whitespace().count(),
            ctx.gate.display(&params.output_file)
        ))
    }
}
