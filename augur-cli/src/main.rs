//! augur-cli: command-line client for the Augur prediction API
//!
//! # Subcommands
//! - `predict <domain> [-f key=value]... [--file body.json]`  run one prediction
//! - `describe <domain>`                                      features and valid options
//! - `history <domain> [-n <limit>] [--csv]`                  recent predictions
//!   (bigmart also takes `--outlet-identifier`, `--outlet-type`, `--min-sales`, `--max-sales`)
//! - `dashboard <domain>`                                     dashboard aggregates
//! - `status`                                                 server health

use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::{Map, Value};

const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "augur-cli", version, about = "Augur prediction API client")]
struct Cli {
    /// Augur HTTP server URL (overrides AUGUR_HTTP_URL env var)
    #[arg(long, env = "AUGUR_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one prediction and print the response
    Predict {
        /// Domain name (bigmart, churn, insurance, loan, rainfall)
        domain: String,

        /// Feature value as key=value; repeat for each feature
        #[arg(short = 'f', long = "field")]
        fields: Vec<String>,

        /// JSON file holding the request body; --field values override it
        #[arg(long)]
        file: Option<String>,
    },

    /// Show a domain's features and valid categorical options
    Describe { domain: String },

    /// Show recent predictions for a domain
    History {
        domain: String,

        /// Maximum number of rows (server default when omitted)
        #[arg(short = 'n', long)]
        limit: Option<u32>,

        /// Print the rows as CSV instead of JSON
        #[arg(long)]
        csv: bool,

        #[command(flatten)]
        filters: HistoryFilters,
    },

    /// Show dashboard aggregates for a domain
    Dashboard { domain: String },

    /// Show server status
    Status,
}

/// BigMart history filters; comma-separated lists are passed through.
#[derive(Debug, Default, clap::Args)]
struct HistoryFilters {
    #[arg(long)]
    outlet_identifier: Option<String>,

    #[arg(long)]
    outlet_type: Option<String>,

    #[arg(long)]
    min_sales: Option<f64>,

    #[arg(long)]
    max_sales: Option<f64>,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HealthDomain {
    pub domain: String,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: Option<String>,
    pub store: Option<String>,
    pub store_version: Option<String>,
    #[serde(default)]
    pub domains: Vec<HealthDomain>,
    pub error: Option<String>,
}

// ============================================================================
// Request building
// ============================================================================

/// Parse `key=value` pairs into a request body. Values that parse as JSON
/// numbers are sent as numbers; everything else is sent as a string.
pub fn parse_fields(fields: &[String]) -> anyhow::Result<Map<String, Value>> {
    let mut body = Map::new();
    for field in fields {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| anyhow!("field '{}' must look like key=value", field))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("field '{}' has an empty key", field);
        }
        let value = match value.trim().parse::<serde_json::Number>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::String(value.to_string()),
        };
        body.insert(key.to_string(), value);
    }
    Ok(body)
}

/// Merge an optional JSON object from a file with `key=value` overrides.
pub fn build_body(file_contents: Option<&str>, fields: &[String]) -> anyhow::Result<Value> {
    let mut body = match file_contents {
        Some(contents) => {
            match serde_json::from_str(contents).context("request file is not valid JSON")? {
                Value::Object(map) => map,
                _ => bail!("request file must hold a JSON object"),
            }
        }
        None => Map::new(),
    };
    body.extend(parse_fields(fields)?);
    Ok(Value::Object(body))
}

/// Query pairs for `/history`; unset options are left off.
fn history_query(
    limit: Option<u32>,
    csv: bool,
    filters: &HistoryFilters,
) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(n) = limit {
        query.push(("limit", n.to_string()));
    }
    if csv {
        query.push(("format", "csv".to_string()));
    }
    if let Some(ids) = &filters.outlet_identifier {
        query.push(("outlet_identifier", ids.clone()));
    }
    if let Some(types) = &filters.outlet_type {
        query.push(("outlet_type", types.clone()));
    }
    if let Some(min) = filters.min_sales {
        query.push(("min_sales", min.to_string()));
    }
    if let Some(max) = filters.max_sales {
        query.push(("max_sales", max.to_string()));
    }
    query
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Print a JSON response body. Non-2xx responses print the server's error and exit 1.
fn print_response(
    url: &str,
    resp: reqwest::Result<reqwest::blocking::Response>,
) -> anyhow::Result<()> {
    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            eprintln!("augur-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: Value = resp.json().unwrap_or(Value::Null);

    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("no error message");
        eprintln!("augur-cli: server returned {}: {}", status, message);
        std::process::exit(1);
    }

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn do_predict(
    server: &str,
    domain: &str,
    fields: &[String],
    file: Option<&str>,
) -> anyhow::Result<()> {
    let contents = match file {
        Some(path) => Some(
            std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path))?,
        ),
        None => None,
    };
    let body = build_body(contents.as_deref(), fields)?;

    let url = format!("{}/{}/predict", server, domain);
    let resp = client(30)?.post(&url).json(&body).send();
    print_response(&url, resp)
}

fn do_get(url: &str) -> anyhow::Result<()> {
    let resp = client(30)?.get(url).send();
    print_response(url, resp)
}

fn do_history(
    server: &str,
    domain: &str,
    limit: Option<u32>,
    csv: bool,
    filters: &HistoryFilters,
) -> anyhow::Result<()> {
    let url = format!("{}/{}/history", server, domain);
    let resp = client(30)?
        .get(&url)
        .query(&history_query(limit, csv, filters))
        .send();
    if !csv {
        return print_response(&url, resp);
    }

    let resp = match resp {
        Ok(r) => r,
        Err(e) => {
            eprintln!("augur-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };
    let status = resp.status();
    let text = resp.text()?;
    if !status.is_success() {
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let message = body["error"].as_str().unwrap_or("no error message");
        eprintln!("augur-cli: server returned {}: {}", status, message);
        std::process::exit(1);
    }
    print!("{}", text);
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = client(10)?.get(&url).send();

    match resp {
        Ok(r) => {
            let healthy = r.status().is_success();
            let health: HealthResponse = r.json()?;
            println!("Augur server: {}", health.status);
            println!("Version:      {}", health.version.as_deref().unwrap_or("?"));
            println!("Store:        {}", health.store.as_deref().unwrap_or("?"));
            if let Some(v) = &health.store_version {
                println!("Store info:   {}", v);
            }
            for d in &health.domains {
                println!("Domain:       {} ({})", d.domain, d.model);
            }
            if !healthy {
                eprintln!(
                    "augur-cli: server unhealthy: {}",
                    health.error.as_deref().unwrap_or("unknown error")
                );
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("augur-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Predict {
            domain,
            fields,
            file,
        } => do_predict(&server, &domain, &fields, file.as_deref()),
        Commands::Describe { domain } => do_get(&format!("{}/{}", server, domain)),
        Commands::History {
            domain,
            limit,
            csv,
            filters,
        } => do_history(&server, &domain, limit, csv, &filters),
        Commands::Dashboard { domain } => do_get(&format!("{}/{}/dashboard", server, domain)),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("augur-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // ========================================================================
    // TEST 1: numbers stay numbers, labels stay strings
    // ========================================================================
    #[test]
    fn test_parse_fields_types() {
        let body = parse_fields(&strings(&["age=30", "bmi=27.9", "region=southwest"])).unwrap();
        assert_eq!(body["age"], 30);
        assert_eq!(body["bmi"], 27.9);
        assert_eq!(body["region"], "southwest");
    }

    // ========================================================================
    // TEST 2: values may contain '=' and spaces
    // ========================================================================
    #[test]
    fn test_parse_fields_keeps_value_text() {
        let fields = strings(&["PaymentMethod=Bank transfer (automatic)", "x=a=b"]);
        let body = parse_fields(&fields).unwrap();
        assert_eq!(body["PaymentMethod"], "Bank transfer (automatic)");
        assert_eq!(body["x"], "a=b");
    }

    // ========================================================================
    // TEST 3: malformed fields are rejected
    // ========================================================================
    #[test]
    fn test_parse_fields_rejects_malformed() {
        assert!(parse_fields(&strings(&["no-equals-sign"])).is_err());
        assert!(parse_fields(&strings(&["=value"])).is_err());
    }

    // ========================================================================
    // TEST 4: --field overrides values from --file
    // ========================================================================
    #[test]
    fn test_build_body_merges_file_and_fields() {
        let file = r#"{"age": 40, "sex": "female"}"#;
        let body = build_body(Some(file), &strings(&["age=41"])).unwrap();
        assert_eq!(body["age"], 41);
        assert_eq!(body["sex"], "female");
    }

    // ========================================================================
    // TEST 5: request file must be a JSON object
    // ========================================================================
    #[test]
    fn test_build_body_rejects_non_object_file() {
        assert!(build_body(Some("[1, 2]"), &[]).is_err());
        assert!(build_body(Some("{broken"), &[]).is_err());
        assert_eq!(build_body(None, &[]).unwrap(), serde_json::json!({}));
    }

    // ========================================================================
    // TEST 6: history query carries only the options that were given
    // ========================================================================
    #[test]
    fn test_history_query() {
        let none = HistoryFilters::default();
        assert!(history_query(None, false, &none).is_empty());
        assert_eq!(history_query(Some(5), false, &none), vec![("limit", "5".to_string())]);

        let filters = HistoryFilters {
            outlet_type: Some("Grocery Store".to_string()),
            min_sales: Some(1000.0),
            ..Default::default()
        };
        assert_eq!(
            history_query(None, true, &filters),
            vec![
                ("format", "csv".to_string()),
                ("outlet_type", "Grocery Store".to_string()),
                ("min_sales", "1000".to_string()),
            ]
        );
    }

    // ========================================================================
    // TEST 7: health response parses with and without optional fields
    // ========================================================================
    #[test]
    fn test_health_response_parses() {
        let healthy: HealthResponse = serde_json::from_str(
            r#"{"status": "healthy", "version": "0.1.0", "store": "memory",
                "store_version": "in-memory",
                "domains": [{"domain": "insurance", "model": "onnx"}]}"#,
        )
        .unwrap();
        assert_eq!(healthy.domains.len(), 1);
        assert_eq!(healthy.domains[0].model, "onnx");

        let unhealthy: HealthResponse = serde_json::from_str(
            r#"{"status": "unhealthy", "store": "postgres", "error": "refused"}"#,
        )
        .unwrap();
        assert!(unhealthy.domains.is_empty());
        assert_eq!(unhealthy.error.as_deref(), Some("refused"));
    }
}
