use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::Deserialize;
use tracing::debug;

use super::{read_text, write_output};
use crate::skills::{de_weekday, Action, Handler, HandlerContext, ParamKind, ParamSpec};

/// Date-only formats, tried in order. The first one that parses wins.
const DATE_FORMATS: [&str; 6] = [
    "%b %d, %Y",
    "%d-%b-%Y",
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%Y/%m/%d",
];

const DATETIME_FORMATS: [&str; 1] = ["%Y/%m/%d %H:%M:%S"];

/// Counts the lines of a date file that fall on a given weekday.
pub struct CountDaysHandler;

#[derive(Debug, Deserialize)]
pub struct CountDaysParams {
    input_file: PathBuf,
    output_file: PathBuf,
    #[serde(deserialize_with = "de_weekday")]
    weekday_name: Weekday,
}

/// Parses one line with the first matching format.
fn parse_date(line: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(line, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(line, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Number of parseable lines falling on `weekday`. Blank and unparseable
/// lines are skipped.
fn count_weekday(text: &str, weekday: Weekday) -> usize {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let date = parse_date(line);
            if date.is_none() {
                debug!("Skipping unparseable date line: {line}");
            }
            date
        })
        .filter(|date| date.weekday() == weekday)
        .count()
}

fn weekday_display(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[async_trait]
impl Handler for CountDaysHandler {
    type Params = CountDaysParams;

    fn action(&self) -> Action {
        Action::CountDays
    }

    fn description(&self) -> &'static str {
        "Count how many dates in a file (one per line) fall on a given weekday and write the count."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input_file", ParamKind::Path),
            ParamSpec::required("output_file", ParamKind::Path),
            ParamSpec::required("weekday_name", ParamKind::String),
        ]
    }

    async fn run(&self, params: CountDaysParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let text = read_text(&params.input_file, ctx).await?;
        let count = count_weekday(&text, params.weekday_name);
        write_output(&params.output_file, count.to_string(), ctx).await?;

        Ok(format!(
            "{count} occurrences of {} written to {}",
            weekday_display(params.weekday_name),
            ctx.gate.display(&params.output_file)
        ))
    }
}
