//! Timeframe commands

use anyhow::Result;
use recommender_lib::{NewTimeframe, Store, Timeframe, TimeframeStatus};
use tabled::Tabled;

use crate::output::{
    color_status, format_timestamp, parse_timestamp, print_records, print_success, OutputFormat,
};

/// Row for timeframes table
#[derive(Tabled)]
struct TimeframeRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "End")]
    end: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub struct AddTimeframe {
    pub name: String,
    pub start: String,
    pub end: String,
    pub on: bool,
    pub description: Option<String>,
}

/// Create a timeframe. It stays off unless `on` is set, in which case the
/// recommender picks it up on its next cycle.
pub async fn add(store: &dyn Store, args: AddTimeframe, format: OutputFormat) -> Result<()> {
    let start = parse_timestamp(&args.start)?;
    let end = parse_timestamp(&args.end)?;
    let status = if args.on {
        TimeframeStatus::On
    } else {
        TimeframeStatus::Off
    };

    let mut timeframe = NewTimeframe::new(args.name, start, end).with_status(status);
    if let Some(description) = args.description {
        timeframe = timeframe.with_description(description);
    }
    let timeframe = store.create_timeframe(timeframe).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&timeframe)?),
        OutputFormat::Table => print_success(&format!(
            "Created timeframe {} (id {}, {})",
            timeframe.name, timeframe.id, timeframe.status
        )),
    }
    Ok(())
}

pub async fn list(store: &dyn Store, format: OutputFormat) -> Result<()> {
    let mut timeframes = store.list_timeframes().await?;
    timeframes.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.name.cmp(&b.name)));

    print_records(&timeframes, format, "No timeframes found", |t: &Timeframe| {
        TimeframeRow {
            id: t.id,
            name: t.name.clone(),
            start: format_timestamp(&t.start),
            end: format_timestamp(&t.end),
            status: color_status(t.status.as_str()),
            description: t.description.clone(),
        }
    })
}

/// Switch a timeframe on or off
pub async fn set_status(store: &dyn Store, name: &str, status: TimeframeStatus) -> Result<()> {
    let mut timeframe = store.get_timeframe(name).await?;
    timeframe.status = status;
    let timeframe = store.update_timeframe(timeframe).await?;
    print_success(&format!("Timeframe {} is now {}", timeframe.name, timeframe.status));
    Ok(())
}

pub async fn delete(store: &dyn Store, name: &str) -> Result<()> {
    store.delete_timeframe(name).await?;
    print_success(&format!("Deleted timeframe {}", name));
    Ok(())
}
