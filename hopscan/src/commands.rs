use crate::CLAP_STYLING;
use clap::{arg, command};

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("hopscan")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("hopscan")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and progress output")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("audit")
                .about(
                    "Follow the redirect chain of each hostname under plain http, plain https \
                and http with optional and forced upgrades, and classify how securely it \
                resolves. Emits one JSON object per hostname.",
                )
                .arg(
                    arg!(-i --"input" <PATH>)
                        .required(false)
                        .help("CSV file whose first column holds hostnames (default: stdin)"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Write JSON lines to this file (default: stdout)"),
                )
                .arg(
                    arg!(--"variant" <VARIANT>)
                        .required(false)
                        .help("full: four navigation policies; basic: plain http and https only")
                        .value_parser(["full", "basic"])
                        .default_value("full"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Per-request timeout in seconds")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .default_value("1"),
                )
                .arg(
                    arg!(-t --"threads" <NUM_HOSTS>)
                        .required(false)
                        .help("Number of hostnames audited concurrently. Output keeps input order.")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("1"),
                ),
        )
}
