//! Extraction handlers backed by the completion service.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::markdown::pipe_through;
use super::{read_text, write_output};
use crate::skills::{Action, Handler, HandlerContext, ParamKind, ParamSpec};

const CARD_DIGITS: usize = 16;

// ── extract_email_sender ──────────────────────────────────

pub struct EmailSenderHandler;

#[derive(Debug, Deserialize)]
pub struct EmailSenderParams {
    input_file: PathBuf,
    output_file: PathBuf,
}

fn sender_prompt(message: &str) -> String {
    format!(
        "Extract the sender's email address from the following message. \
         Reply with the address only.\n\n{message}"
    )
}

#[async_trait]
impl Handler for EmailSenderHandler {
    type Params = EmailSenderParams;

    fn action(&self) -> Action {
        Action::ExtractEmailSender
    }

    fn description(&self) -> &'static str {
        "Extract the sender's email address from an email message file."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input_file", ParamKind::Path),
            ParamSpec::required("output_file", ParamKind::Path),
        ]
    }

    async fn run(&self, params: EmailSenderParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let message = read_text(&params.input_file, ctx).await?;
        let sender = ctx
            .llm
            .complete(&sender_prompt(&message))
            .await
            .context("completion service failed")?;
        let sender = sender.trim();
        if sender.is_empty() {
            anyhow::bail!("no sender address found");
        }

        write_output(&params.output_file, sender, ctx).await?;
        Ok(format!(
            "Sender address written to {}",
            ctx.gate.display(&params.output_file)
        ))
    }
}

// ── extract_credit_card_number ────────────────────────────

pub struct CreditCardHandler;

#[derive(Debug, Deserialize)]
pub struct CreditCardParams {
    input_image: PathBuf,
    output_file: PathBuf,
}

fn card_prompt(ocr_text: &str) -> String {
    format!(
        "The following text was read by OCR from an image of a payment card. \
         Reply with the card number only, as {CARD_DIGITS} digits without spaces.\n\n{ocr_text}"
    )
}

/// Keeps the digits of the completion and takes the first sixteen.
fn card_number(reply: &str) -> Option<String> {
    let digits: String = reply
        .chars()
        .filter(char::is_ascii_digit)
        .take(CARD_DIGITS)
        .collect();
    (digits.len() == CARD_DIGITS).then_some(digits)
}

#[async_trait]
impl Handler for CreditCardHandler {
    type Params = CreditCardParams;

    fn action(&self) -> Action {
        Action::ExtractCreditCardNumber
    }

    fn description(&self) -> &'static str {
        "Read the card number from an image of a payment card (OCR) and write it as 16 digits."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input_image", ParamKind::Path),
            ParamSpec::required("output_file", ParamKind::Path),
        ]
    }

    async fn run(&self, params: CreditCardParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let image = tokio::fs::read(&params.input_image)
            .await
            .with_context(|| format!("cannot read {}", ctx.gate.display(&params.input_image)))?;

        let mut command = ctx.tools.tesseract.clone();
        command.extend(["stdin", "stdout", "--psm", "6"].map(String::from));
        let ocr = pipe_through(&command, image).await.context("OCR failed")?;
        let ocr = String::from_utf8_lossy(&ocr);
        debug!("OCR produced {} characters", ocr.len());

        let reply = ctx
            .llm
            .complete(&card_prompt(&ocr))
            .await
            .context("completion service failed")?;
        let number = card_number(&reply)
            .ok_or_else(|| anyhow::anyhow!("could not read a {CARD_DIGITS}-digit card number"))?;

        write_output(&params.output_file, number, ctx).await?;
        Ok(format!(
            "Card number written to {}",
            ctx.gate.display(&params.output_file)
        ))
    }
}
