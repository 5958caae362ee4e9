use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags};
use serde::Deserialize;
use serde_json::json;

use super::write_output;
use crate::skills::{Action, Handler, HandlerContext, ParamKind, ParamSpec};

const DEFAULT_TICKET_TYPE: &str = "Gold";

const TOTAL_SALES_QUERY: &str = "\
SELECT COALESCE(SUM(units * price), 0)
FROM tickets
WHERE TRIM(LOWER(type)) = LOWER(?1)";

/// Totals `units * price` for one ticket type in a SQLite database.
pub struct TicketSalesHandler;

#[derive(Debug, Deserialize)]
pub struct TicketSalesParams {
    db_file: PathBuf,
    output_file: PathBuf,
    ticket_type: String,
}

/// Runs the aggregation on a read-only connection.
fn total_sales(db: &Path, ticket_type: &str) -> rusqlite::Result<f64> {
    let conn = Connection::open_with_flags(
        db,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.query_row(TOTAL_SALES_QUERY, [ticket_type.trim()], |row| {
        row.get::<_, f64>(0)
    })
}

/// Whole totals are written without a decimal point.
fn format_total(total: f64) -> String {
    if total.fract() == 0.0 && total.abs() < 1e15 {
        format!("{}", total as i64)
    } else {
        total.to_string()
    }
}

#[async_trait]
impl Handler for TicketSalesHandler {
    type Params = TicketSalesParams;

    fn action(&self) -> Action {
        Action::CalculateTicketSales
    }

    fn description(&self) -> &'static str {
        "Total sales (units * price) of one ticket type in the `tickets` table of a SQLite database."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("db_file", ParamKind::Path),
            ParamSpec::required("output_file", ParamKind::Path),
            ParamSpec::optional("ticket_type", ParamKind::String, json!(DEFAULT_TICKET_TYPE)),
        ]
    }

    async fn run(&self, params: TicketSalesParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let shown = ctx.gate.display(&params.db_file);
        if !tokio::fs::try_exists(&params.db_file).await.unwrap_or(false) {
            anyhow::bail!("database {shown} does not exist");
        }

        let db = params.db_file.clone();
        let ticket_type = params.ticket_type.clone();
        let total = tokio::task::spawn_blocking(move || total_sales(&db, &ticket_type))
            .await
            .context("query task failed")?
            .with_context(|| format!("query on {shown} failed"))?;

        write_output(&params.output_file, format_total(total), ctx).await?;
        Ok(format!(
            "Total sales of '{}' tickets written to {}",
            params.ticket_type.trim(),
            ctx.gate.display(&params.output_file)
        ))
    }
}
