//! Output formatting for CLI commands.

use serde::Serialize;

use crate::cli::args::{OutputFormat, PilumArgs};
use crate::error::Result;
use crate::index::{ConstructionReport, ExecutionStats};

/// Result structure for journal import.
#[derive(Debug, Serialize)]
pub struct ImportResult {
    pub journal: String,
    pub records: u64,
}

/// Result structure for index construction.
#[derive(Debug, Serialize)]
pub struct ConstructResult {
    pub staged_dir: String,
    pub report: Option<ConstructionReport>,
    pub switched: bool,
    pub duration_ms: u64,
}

/// Result structure for an index switch.
#[derive(Debug, Serialize)]
pub struct SwitchResult {
    pub live_dir: String,
    pub documents: usize,
    pub loaded: bool,
}

/// Result structure for query execution.
#[derive(Debug, Serialize)]
pub struct QueryResults {
    pub ids: Vec<u64>,
    pub total: usize,
    pub stats: ExecutionStats,
    pub duration_ms: u64,
}

/// Posting counts of one term.
#[derive(Debug, Serialize)]
pub struct TermStats {
    pub term_id: u64,
    pub full: usize,
    pub prio: usize,
}

/// Index statistics.
#[derive(Debug, Serialize)]
pub struct IndexStats {
    pub live_dir: String,
    pub loaded: bool,
    pub documents: usize,
    pub full_terms: usize,
    pub prio_terms: usize,
    pub terms: Vec<TermStats>,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &PilumArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_human<T: Serialize>(message: &str, result: &T, args: &PilumArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    print_object(&value, 0);
    Ok(())
}

fn print_object(value: &serde_json::Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                match val {
                    serde_json::Value::Object(_) => {
                        println!("{indent}{key}:");
                        print_object(val, depth + 1);
                    }
                    serde_json::Value::Array(arr) if arr.iter().any(|v| v.is_object()) => {
                        println!("{indent}{key}:");
                        for item in arr {
                            print_object(item, depth + 1);
                            println!();
                        }
                    }
                    _ => println!("{indent}{key}: {}", format_value(val)),
                }
            }
        }
        _ => println!("{indent}{}", format_value(value)),
    }
}

fn output_json<T: Serialize>(result: &T, args: &PilumArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Format a JSON value for display.
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => {
            let formatted_values = arr.iter().map(format_value).collect::<Vec<_>>().join(", ");
            format!("[{formatted_values}]")
        }
        serde_json::Value::Object(_) => "[object]".to_string(),
        serde_json::Value::Null => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&json!([1, 2, 3])), "[1, 2, 3]");
        assert_eq!(format_value(&json!(null)), "-");
        assert_eq!(format_value(&json!("current")), "current");
    }
}
