//! Recommendation listing

use anyhow::Result;
use recommender_lib::{ApplicationResource, Store};
use tabled::Tabled;

use crate::output::{format_bytes, format_cpu, format_timestamp, print_warning, OutputFormat};

/// Row for container recommendations table
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Application")]
    application: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
    #[tabled(rename = "Disk R")]
    disk_read: String,
    #[tabled(rename = "Disk W")]
    disk_write: String,
    #[tabled(rename = "Net Rx")]
    network_receive: String,
    #[tabled(rename = "Net Tx")]
    network_transmit: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// Show current recommendations, or those of one timeframe
pub async fn show(
    store: &dyn Store,
    application: Option<String>,
    timeframe: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let resources = match (&timeframe, &application) {
        (None, None) => store.list_application_resources().await?,
        (None, Some(app)) => vec![store.get_application_resource(app).await?],
        (Some(tf), None) => store.list_timeframe_application_resources(tf).await?,
        (Some(tf), Some(app)) => vec![store.get_timeframe_application_resource(tf, app).await?],
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resources)?),
        OutputFormat::Table => print_table(&resources, timeframe.as_deref()),
    }
    Ok(())
}

fn print_table(resources: &[ApplicationResource], timeframe: Option<&str>) {
    let rows: Vec<ContainerRow> = resources
        .iter()
        .flat_map(|app| {
            app.container_resources.iter().map(move |c| ContainerRow {
                application: app.name.clone(),
                container: c.name.clone(),
                cpu: format_cpu(c.cpu_limit),
                memory: format_bytes(c.memory_limit),
                disk_read: c.disk_read_io_limit.to_string(),
                disk_write: c.disk_write_io_limit.to_string(),
                network_receive: format_bytes(c.network_receive_io_limit),
                network_transmit: format_bytes(c.network_transmit_io_limit),
                updated: format_timestamp(&c.updated),
            })
        })
        .collect();

    if rows.is_empty() {
        print_warning("No recommendations found");
        return;
    }

    let count = rows.len();
    let table = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
    match timeframe {
        Some(tf) => println!("\nTotal: {} containers in timeframe {}", count, tf),
        None => println!("\nTotal: {} containers", count),
    }
}
