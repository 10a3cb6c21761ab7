use serde::Serialize;
use staffly_core::config::{AppConfig, LoadOptions, LogFormat};

#[derive(Debug, Serialize)]
struct ConfigView {
    database_url: String,
    database_max_connections: u32,
    database_timeout_secs: u64,
    notify_webhook_url: Option<String>,
    notify_token: Option<&'static str>,
    server_bind_address: String,
    server_port: u16,
    vacation_annual_entitlement_days: u32,
    vacation_on_demand_cap: u32,
    vacation_circumstantial_event_cap: u32,
    vacation_carried_over_expiry: String,
    logging_level: String,
    logging_format: &'static str,
}

/// Render the effective configuration after defaults, file, environment and
/// overrides are merged. Secrets are redacted, never printed.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return format!("config: failed to load configuration: {error}");
        }
    };

    let view = ConfigView {
        database_url: config.database.url.clone(),
        database_max_connections: config.database.max_connections,
        database_timeout_secs: config.database.timeout_secs,
        notify_webhook_url: config.notify.webhook_url.clone(),
        notify_token: config.notify.token.is_some().then_some("<redacted>"),
        server_bind_address: config.server.bind_address.clone(),
        server_port: config.server.port,
        vacation_annual_entitlement_days: config.vacation.annual_entitlement_days,
        vacation_on_demand_cap: config.vacation.on_demand_cap,
        vacation_circumstantial_event_cap: config.vacation.circumstantial_event_cap,
        vacation_carried_over_expiry: format!(
            "{:02}-{:02}",
            config.vacation.carried_over_expiry_month, config.vacation.carried_over_expiry_day
        ),
        logging_level: config.logging.level.clone(),
        logging_format: match config.logging.format {
            LogFormat::Compact => "compact",
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        },
    };

    serde_json::to_string_pretty(&view)
        .unwrap_or_else(|error| format!("config: serialization failed: {error}"))
}
