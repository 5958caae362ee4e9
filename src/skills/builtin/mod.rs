//! The builtin operation catalogue.
//!
//! Handlers receive filesystem parameters already resolved inside the
//! sandbox. Messages and errors refer to files by their mount form
//! (`/data/...`) so the real sandbox location never leaves the process.

pub mod contacts;
pub mod count_days;
pub mod extract;
pub mod fetch;
pub mod logs;
pub mod markdown;
pub mod media;
pub mod similarity;
pub mod tickets;

use std::path::Path;

use anyhow::Context;
use tracing::info;

pub use contacts::SortContactsHandler;
pub use count_days::CountDaysHandler;
pub use extract::{CreditCardHandler, EmailSenderHandler};
pub use fetch::{FetchUrlHandler, ScrapeWebsiteHandler};
pub use logs::RecentLogsHandler;
pub use markdown::{FormatMarkdownHandler, MarkdownIndexHandler, MarkdownToHtmlHandler};
pub use media::{CompressImageHandler, TranscribeAudioHandler};
pub use similarity::SimilarCommentsHandler;
pub use tickets::TicketSalesHandler;

use super::{Action, HandlerContext, RegistryBuilder};

/// Registers every builtin handler except the `disabled` actions.
/// Unknown names in `disabled` are a startup error.
pub fn register_all(builder: &mut RegistryBuilder, disabled: &[String]) -> anyhow::Result<()> {
    let mut skip = Vec::with_capacity(disabled.len());
    for name in disabled {
        let action: Action = name
            .parse()
            .map_err(|_| anyhow::anyhow!("Cannot disable unknown action '{name}'"))?;
        info!("Handler disabled by config: {action}");
        skip.push(action);
    }
    let enabled = |action: Action| !skip.contains(&action);

    if enabled(Action::CountDays) {
        builder.register(CountDaysHandler)?;
    }
    if enabled(Action::SortContacts) {
        builder.register(SortContactsHandler)?;
    }
    if enabled(Action::WriteRecentLogs) {
        builder.register(RecentLogsHandler)?;
    }
    if enabled(Action::CreateMarkdownIndex) {
        builder.register(MarkdownIndexHandler)?;
    }
    if enabled(Action::ExtractEmailSender) {
        builder.register(EmailSenderHandler)?;
    }
    if enabled(Action::ExtractCreditCardNumber) {
        builder.register(CreditCardHandler)?;
    }
    if enabled(Action::FindMostSimilarComments) {
        builder.register(SimilarCommentsHandler)?;
    }
    if enabled(Action::CalculateTicketSales) {
        builder.register(TicketSalesHandler)?;
    }
    if enabled(Action::FormatMarkdownFile) {
        builder.register(FormatMarkdownHandler)?;
    }
    if enabled(Action::FetchUrl) {
        builder.register(FetchUrlHandler::new())?;
    }
    if enabled(Action::ScrapeWebsite) {
        builder.register(ScrapeWebsiteHandler::new())?;
    }
    if enabled(Action::ConvertMarkdownToHtml) {
        builder.register(MarkdownToHtmlHandler)?;
    }
    if enabled(Action::CompressImage) {
        builder.register(CompressImageHandler)?;
    }
    if enabled(Action::TranscribeAudio) {
        builder.register(TranscribeAudioHandler)?;
    }
    Ok(())
}

/// Reads a UTF-8 input file.
pub(crate) async fn read_text(path: &Path, ctx: &HandlerContext) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", ctx.gate.display(path)))
}

/// Writes an output file, creating missing parent directories.
pub(crate) async fn write_output(
    path: &Path,
    contents: impl AsRef<[u8]>,
    ctx: &HandlerContext,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("cannot create directory for {}", ctx.gate.display(path)))?;
    }
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("cannot write {}", ctx.gate.display(path)))
}
