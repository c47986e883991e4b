use clap::Parser;

const AFTER_HELP: &str = r#"Examples:
  # Open 10 connections
  pgidle -n 10

  # Open 20 connections that all set an application name
  pgidle -n 20 -q "SET application_name = 'pgidle'"

  # Set several session variables on every connection
  pgidle -n 10 -q "SET timezone = 'UTC'; SET statement_timeout = '5min'"

  # Run the statements on only half of the connections
  pgidle -n 20 -q "SET application_name = 'pgidle'" --query-percent 50
"#;

/// Holds open PostgreSQL connections against a pooling proxy and reports
/// their health until interrupted.
#[derive(Parser, Debug)]
#[command(name = "pgidle", after_help = AFTER_HELP)]
pub struct Cli {
    /// Number of connections to open
    #[arg(short = 'n', long, default_value_t = 10, value_parser = parse_count)]
    pub num_connections: usize,

    /// SQL to run on each qualifying connection right after it is opened;
    /// multiple statements can be separated with ';'
    #[arg(short = 'q', long, value_name = "SQL")]
    pub init_query: Option<String>,

    /// Percentage (0-100) of connections that run the init query;
    /// all of them when omitted
    #[arg(long, value_name = "PERCENT", requires = "init_query", value_parser = parse_percent)]
    pub query_percent: Option<f64>,
}

fn parse_count(s: &str) -> Result<usize, String> {
    let count: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid connection count"))?;
    if count == 0 {
        return Err("at least one connection is required".into());
    }
    Ok(count)
}

fn parse_percent(s: &str) -> Result<f64, String> {
    let percent: f64 = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid percentage"))?;
    if !(0.0..=100.0).contains(&percent) {
        return Err("percentage must be between 0 and 100".into());
    }
    Ok(percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["pgidle"]).unwrap();
        assert_eq!(cli.num_connections, 10);
        assert!(cli.init_query.is_none());
        assert!(cli.query_percent.is_none());
    }

    #[test]
    fn full_invocation() {
        let cli = Cli::try_parse_from([
            "pgidle",
            "-n",
            "20",
            "-q",
            "SET application_name = 'pgidle'",
            "--query-percent",
            "50",
        ])
        .unwrap();
        assert_eq!(cli.num_connections, 20);
        assert_eq!(
            cli.init_query.as_deref(),
            Some("SET application_name = 'pgidle'")
        );
        assert_eq!(cli.query_percent, Some(50.0));
    }

    #[test]
    fn query_percent_requires_init_query() {
        assert!(Cli::try_parse_from(["pgidle", "--query-percent", "50"]).is_err());
    }

    #[test]
    fn query_percent_out_of_range_rejected() {
        assert!(Cli::try_parse_from(["pgidle", "-q", "SET a = 1", "--query-percent", "101"])
            .is_err());
        assert!(Cli::try_parse_from(["pgidle", "-q", "SET a = 1", "--query-percent=-1"]).is_err());
    }

    #[test]
    fn zero_connections_rejected() {
        assert!(Cli::try_parse_from(["pgidle", "-n", "0"]).is_err());
    }
}
