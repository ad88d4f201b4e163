//! Main `DroidReach` binary command line arguments options.
//!
//! This module declares a function to build `clap` command line arguments
//! parser, so that it can be used from other places than the main binary,
//! such as from bash completion file generator.

use clap::{value_parser, Arg, ArgAction, Command};
use clap_complete::Shell;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

fn arg_debug() -> Arg {
    Arg::new("debug")
        .short('d')
        .long("debug")
        .action(ArgAction::SetTrue)
        .help("Activate debug mode")
}

fn arg_verbose() -> Arg {
    Arg::new("verbose")
        .short('v')
        .long("verbose")
        .action(ArgAction::SetTrue)
        .help("Activate verbose mode")
}

fn arg_ecslog() -> Arg {
    Arg::new("ecslog")
        .short('e')
        .long("ecslog")
        .action(ArgAction::SetTrue)
        .help("Output logs in ECS format")
}

fn arg_input() -> Arg {
    Arg::new("input")
        .short('i')
        .long("input")
        .action(ArgAction::Set)
        .required(true)
        .help("Input bundle (JSON disassembler output)")
}

fn arg_system() -> Arg {
    Arg::new("system")
        .short('s')
        .long("system")
        .action(ArgAction::Set)
        .help("Additional system/core/api classes file")
}

fn arg_output(help: &str) -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .action(ArgAction::Set)
        .help(help.to_string())
}

fn arg_app_only() -> Arg {
    Arg::new("app-only")
        .long("app-only")
        .action(ArgAction::SetTrue)
        .help("Resolve virtual calls to application methods only")
}

fn arg_usage_depth() -> Arg {
    Arg::new("usage-depth")
        .long("usage-depth")
        .action(ArgAction::Set)
        .value_parser(value_parser!(usize))
        .help("Depth of the class usage search used to find fragments hosts")
}

fn arg_filter_class() -> Arg {
    Arg::new("filter-class")
        .long("filter-class")
        .action(ArgAction::Set)
        .help("Class(es) regex filter")
}

fn arg_filter_method() -> Arg {
    Arg::new("filter-method")
        .long("filter-method")
        .action(ArgAction::Set)
        .help("Method(s) regex filter")
}

fn analysis_command(name: &'static str, bin_name: &'static str, about: &'static str) -> Command {
    Command::new(name)
        .bin_name(bin_name)
        .version(VERSION)
        .author(AUTHORS)
        .about(about)
        .arg(arg_debug())
        .arg(arg_verbose())
        .arg(arg_ecslog())
        .arg(arg_input())
        .arg(arg_system())
        .arg(arg_app_only())
        .arg(arg_usage_depth())
}

#[must_use]
pub fn droidreach() -> Command {
    Command::new(NAME)
        .version(VERSION)
        .author(AUTHORS)
        .about(DESCRIPTION)
        .subcommand(callgraph())
        .subcommand(components())
        .subcommand(hierarchy())
        .subcommand(path())
        .subcommand(
            Command::new("gen-completions")
                .about("Generates completions file")
                .arg(
                    Arg::new("shell")
                        .short('s')
                        .long("shell")
                        .action(ArgAction::Set)
                        .value_parser(value_parser!(Shell))
                        .required(true)
                        .help("Shell type for completion generation"),
                ),
        )
}

#[must_use]
pub fn callgraph() -> Command {
    analysis_command("callgraph", "dr-callgraph", "Builds the application call tree")
        .arg(arg_output("Output JSON edges file"))
        .arg(arg_filter_class())
        .arg(arg_filter_method())
}

#[must_use]
pub fn components() -> Command {
    analysis_command(
        "components",
        "dr-components",
        "Prints application components and their resolved relations",
    )
    .arg(
        Arg::new("type")
            .short('t')
            .long("type")
            .action(ArgAction::Set)
            .value_parser(["activity", "fragment", "service", "receiver", "binder"])
            .help("Only print components of the given type"),
    )
    .arg(arg_filter_class())
}

#[must_use]
pub fn hierarchy() -> Command {
    analysis_command(
        "hierarchy",
        "dr-hierarchy",
        "Prints classes hierarchy relations",
    )
    .arg(
        Arg::new("class")
            .short('c')
            .long("class")
            .action(ArgAction::Set)
            .help("Class to inspect (internal name, e.g. com/example/Main)"),
    )
    .arg(
        Arg::new("missing")
            .short('m')
            .long("missing")
            .action(ArgAction::SetTrue)
            .conflicts_with("class")
            .help("Print classes referenced but not defined"),
    )
    .arg(arg_filter_class())
}

#[must_use]
pub fn path() -> Command {
    analysis_command(
        "path",
        "dr-path",
        "Prints a shortest call path to the given methods",
    )
    .after_help("Example:\n $ dr-path -i app.json -t 'Lcom/example/Net;->send(Ljava/lang/String;)V'")
    .arg(
        Arg::new("from")
            .short('f')
            .long("from")
            .action(ArgAction::Set)
            .conflicts_with("find")
            .help("Source method (default is the application entry point)"),
    )
    .arg(
        Arg::new("to")
            .short('t')
            .long("to")
            .action(ArgAction::Append)
            .required_unless_present("find")
            .help("Target method, or ordered waypoints when repeated"),
    )
    .arg(
        Arg::new("find")
            .long("find")
            .action(ArgAction::SetTrue)
            .help("Target the first method matching the filters"),
    )
    .arg(arg_filter_class())
    .arg(arg_filter_method())
}
