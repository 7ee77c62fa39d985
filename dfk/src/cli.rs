//! Command line surface of `dfk`.

use crate::dispatch::DispatchRequest;
use clap::Parser;
use dfk_common::{ArchiveLocation, DfkError, ExecutionPlan, Label, PortSpec, Principal};
use std::path::PathBuf;

/// Fork a process on a remote machine and connect to its stdin/stdout.
#[derive(Parser, Debug)]
#[command(name = "dfk")]
#[command(author, version, about = "distfork - forks a process on a remote machine and connects to its stdin/stdout")]
pub struct Cli {
    /// Label controlling where to execute the command
    #[arg(short = 'l', long, value_name = "LABEL")]
    pub label: Option<String>,

    /// Human readable name describing the command
    #[arg(short = 'n', long, value_name = "NAME")]
    pub name: Option<String>,

    /// Estimated duration in milliseconds, or -1 if unknown
    #[arg(
        short = 'd',
        long,
        value_name = "MILLIS",
        default_value_t = -1,
        allow_negative_numbers = true
    )]
    pub duration: i64,

    /// Zip/tgz file extracted on the worker before the command runs; `=zip`
    /// or `=tgz` reads it from stdin
    #[arg(short = 'z', value_name = "FILE")]
    pub input: Option<ArchiveLocation>,

    /// Bring back files added or updated by the command as a zip/tgz bundle
    /// written to FILE; `=zip` or `=tgz` writes it to stdout
    #[arg(short = 'Z', value_name = "FILE")]
    pub output: Option<ArchiveLocation>,

    /// Environment variable for the launched process
    #[arg(short = 'e', value_name = "NAME=VAL", value_parser = parse_env_assignment)]
    pub env: Vec<(String, String)>,

    /// Copy a single file into the scratch directory
    #[arg(short = 'f', value_name = "FILE")]
    pub copy_in: Vec<String>,

    /// Copy a single file back from the scratch directory
    #[arg(short = 'F', value_name = "FILE")]
    pub copy_out: Vec<String>,

    /// Listen locally and forward to HOST:PORT as seen from the worker
    #[arg(short = 'L', value_name = "PORT:HOST:PORT")]
    pub local_forwards: Vec<PortSpec>,

    /// Listen on the worker and forward to HOST:PORT as seen from here
    #[arg(short = 'R', value_name = "PORT:HOST:PORT")]
    pub remote_forwards: Vec<PortSpec>,

    /// Configuration file
    #[arg(long, env = "DFK_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to run, with its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

fn parse_env_assignment(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, val)) if !name.is_empty() => Ok((name.to_string(), val.to_string())),
        _ => Err(format!("expected NAME=VAL, got '{}'", value)),
    }
}

impl Cli {
    /// Turn the parsed arguments into a dispatch request for `principal`.
    pub fn into_request(self, principal: Principal) -> Result<DispatchRequest, DfkError> {
        let mut plan = ExecutionPlan::new(self.command)?;
        plan.env.extend(self.env);
        plan.input = self.input;
        plan.output = self.output;
        plan.copy_in = self.copy_in;
        plan.copy_out = self.copy_out;
        plan.local_forwards = self.local_forwards;
        plan.remote_forwards = self.remote_forwards;

        Ok(DispatchRequest {
            label: self.label.map(Label::new),
            display_name: self.name,
            estimated_duration_ms: self.duration,
            plan,
            principal,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dfk_common::ArchiveFormat;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("dfk").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_options_stop_at_first_command_token() {
        let cli = parse(&["-l", "linux", "make", "-j4", "-l", "x"]);
        assert_eq!(cli.label.as_deref(), Some("linux"));
        assert_eq!(cli.command, ["make", "-j4", "-l", "x"]);
        assert_eq!(cli.duration, -1);
    }

    #[test]
    fn test_full_option_set() {
        let cli = parse(&[
            "-n", "build", "-d", "5000", "-z", "=tgz", "-Z", "out.zip", "-e", "A=1", "-e",
            "B=x=y", "-f", "src/notes", "-F", "result", "-L", "8080:db:5432", "-R",
            "9000:localhost:9000", "cargo", "build",
        ]);
        let request = cli.into_request(Principal::new("alice")).unwrap();

        assert_eq!(request.display_name.as_deref(), Some("build"));
        assert_eq!(request.estimated_duration_ms, 5000);
        let plan = &request.plan;
        assert_eq!(plan.command(), ["cargo", "build"]);
        assert_eq!(plan.input, Some(ArchiveLocation::Inline(ArchiveFormat::TarGz)));
        assert_eq!(plan.output.as_ref().map(|o| o.format()), Some(ArchiveFormat::Zip));
        assert_eq!(plan.env.get("B").map(String::as_str), Some("x=y"));
        assert_eq!(plan.copy_in, ["src/notes"]);
        assert_eq!(plan.copy_out, ["result"]);
        assert_eq!(plan.local_forwards, [PortSpec::new(8080, "db", 5432)]);
        assert_eq!(plan.remote_forwards[0].to_string(), "9000:localhost:9000");
    }

    #[test]
    fn test_bad_port_spec_is_rejected() {
        let err = Cli::try_parse_from(["dfk", "-L", "8080:db", "true"]).unwrap_err();
        assert!(err.to_string().contains("8080:db"));
    }

    #[test]
    fn test_bad_env_assignment_is_rejected() {
        assert!(Cli::try_parse_from(["dfk", "-e", "NOEQUALS", "true"]).is_err());
    }

    #[test]
    fn test_missing_command_is_submission_rejected() {
        let err = parse(&["-l", "linux"])
            .into_request(Principal::anonymous())
            .unwrap_err();
        assert!(matches!(err, DfkError::SubmissionRejected(_)));
    }
}
