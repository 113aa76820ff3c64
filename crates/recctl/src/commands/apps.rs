//! Application commands

use anyhow::Result;
use recommender_lib::{Application, Store};
use tabled::Tabled;

use crate::output::{format_timestamp, print_records, print_success, OutputFormat};

/// Row for applications table
#[derive(Tabled)]
struct ApplicationRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

pub async fn add(store: &dyn Store, name: &str, format: OutputFormat) -> Result<()> {
    let application = store.create_application(name).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&application)?),
        OutputFormat::Table => print_success(&format!(
            "Created application {} (id {})",
            application.name, application.id
        )),
    }
    Ok(())
}

pub async fn list(store: &dyn Store, format: OutputFormat) -> Result<()> {
    let mut applications = store.list_applications().await?;
    applications.sort_by(|a, b| a.name.cmp(&b.name));

    print_records(&applications, format, "No applications found", |a: &Application| {
        ApplicationRow {
            id: a.id,
            name: a.name.clone(),
            created: format_timestamp(&a.created),
            updated: format_timestamp(&a.updated),
        }
    })
}

pub async fn rename(store: &dyn Store, name: &str, new_name: &str) -> Result<()> {
    let application = store.update_application(name, new_name).await?;
    print_success(&format!("Renamed application {} to {}", name, application.name));
    Ok(())
}

/// Delete an application together with its recommendations
pub async fn delete(store: &dyn Store, name: &str) -> Result<()> {
    store.delete_application(name).await?;
    print_success(&format!("Deleted application {}", name));
    Ok(())
}
