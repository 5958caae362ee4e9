use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::{read_text, write_output};
use crate::skills::{Action, Handler, HandlerContext, ParamKind, ParamSpec};

/// Finds the two most similar comments in a file by embedding similarity.
pub struct SimilarCommentsHandler;

#[derive(Debug, Deserialize)]
pub struct SimilarCommentsParams {
    input_file: PathBuf,
    output_file: PathBuf,
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Indices of the distinct pair with the largest dot product.
/// The first pair wins on ties.
fn most_similar_pair(vectors: &[Vec<f32>]) -> Option<(usize, usize)> {
    let mut best: Option<((usize, usize), f32)> = None;
    for i in 0..vectors.len() {
        for j in (i + 1)..vectors.len() {
            let score = dot(&vectors[i], &vectors[j]);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some(((i, j), score));
            }
        }
    }
    best.map(|(pair, _)| pair)
}

#[async_trait]
impl Handler for SimilarCommentsHandler {
    type Params = SimilarCommentsParams;

    fn action(&self) -> Action {
        Action::FindMostSimilarComments
    }

    fn description(&self) -> &'static str {
        "Find the two most similar comments (one per line) using embeddings and write them, one per line."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input_file", ParamKind::Path),
            ParamSpec::required("output_file", ParamKind::Path),
        ]
    }

    async fn run(&self, params: SimilarCommentsParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let embeddings = ctx
            .embeddings
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no embedding service is configured"))?;

        let text = read_text(&params.input_file, ctx).await?;
        let comments: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();
        if comments.len() < 2 {
            anyhow::bail!(
                "{} needs at least two comments, found {}",
                ctx.gate.display(&params.input_file),
                comments.len()
            );
        }

        let vectors = embeddings
            .embed(&comments)
            .await
            .context("embedding service failed")?;
        if vectors.len() != comments.len() {
            anyhow::bail!(
                "embedding service returned {} vectors for {} comments",
                vectors.len(),
                comments.len()
            );
        }

        let (i, j) = most_similar_pair(&vectors)
            .ok_or_else(|| anyhow::anyhow!("no comment pair to compare"))?;
        let mut pair = [comments[i].as_str(), comments[j].as_str()];
        pair.sort_unstable();

        write_output(&params.output_file, pair.join("\n"), ctx).await?;
        Ok(format!(
            "Most similar of {} comments written to {}",
            comments.len(),
            ctx.gate.display(&params.output_file)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{context, context_with, FakeCompletion, FakeEmbeddings};
    use crate::agent::ErrorKind;
    use crate::skills::Invoke;
    use serde_json::json;
    use std::sync::Arc;

    fn params(root: &std::path::Path) -> serde_json::Map<String, serde_json::Value> {
        json!({"input_file": root.join("comments.txt"), "output_file": root.join("similar.txt")})
            .as_object()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_most_similar_pair() {
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.9, 0.1],
            vec![0.7, 0.0, 0.7],
        ];
        assert_eq!(most_similar_pair(&vectors), Some((1, 2)));
        assert_eq!(most_similar_pair(&vectors[..1]), None);
    }

    #[tokio::test]
    async fn test_writes_sorted_pair() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("comments.txt"),
            "Great product\n\nTerrible support\nReally great product\nShipping was slow\n",
        )
        .unwrap();
        let embeddings = FakeEmbeddings::new(vec![
            ("Great product", vec![0.9, 0.1, 0.0]),
            ("Terrible support", vec![0.0, 0.2, 0.9]),
            ("Really great product", vec![0.8, 0.2, 0.0]),
            ("Shipping was slow", vec![0.1, 0.9, 0.1]),
        ]);
        let ctx = context_with(
            dir.path(),
            Arc::new(FakeCompletion::new(vec![])),
            Some(Arc::new(embeddings)),
        );
        let root = ctx.gate.root().to_path_buf();

        let message = SimilarCommentsHandler
            .invoke(params(&root), &ctx)
            .await
            .unwrap();
        assert_eq!(message, "Most similar of 4 comments written to /data/similar.txt");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("similar.txt")).unwrap(),
            "Great product\nReally great product"
        );
    }

    #[tokio::test]
    async fn test_requires_two_comments() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("comments.txt"), "only one\n").unwrap();
        let ctx = context_with(
            dir.path(),
            Arc::new(FakeCompletion::new(vec![])),
            Some(Arc::new(FakeEmbeddings::new(vec![]))),
        );
        let root = ctx.gate.root().to_path_buf();
        let err = SimilarCommentsHandler
            .invoke(params(&root), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HandlerError);
        assert!(err.to_string().contains("at least two"));
    }

    #[tokio::test]
    async fn test_requires_embedding_service() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("comments.txt"), "a\nb\n").unwrap();
        let ctx = context(dir.path());
        let root = ctx.gate.root().to_path_buf();
        let err = SimilarCommentsHandler
            .invoke(params(&root), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no embedding service"));
    }
}
