use clap::ArgMatches;
use clap_complete::{generate, Shell};
use droidreach::prelude::*;
use droidreach::{cli, dr_callgraph, dr_components, dr_hierarchy, dr_path};
use std::io;

fn main() -> DrResult<()> {
    let args = cli::droidreach().get_matches();

    match &args.subcommand() {
        Some(("callgraph", cmd_args)) => dr_callgraph::run(cmd_args),
        Some(("components", cmd_args)) => dr_components::run(cmd_args),
        Some(("hierarchy", cmd_args)) => dr_hierarchy::run(cmd_args),
        Some(("path", cmd_args)) => dr_path::run(cmd_args),
        Some(("gen-completions", sub_args)) => subcommand_gen_completions(sub_args),
        Some((subcommand, _)) => Err(DrError::BadArguments(format!(
            "unknown subcommand '{subcommand}'"
        ))),
        None => Err(DrError::BadArguments("missing subcommand".to_string())),
    }
}

fn subcommand_gen_completions(sub_args: &ArgMatches) -> DrResult<()> {
    let generator = *sub_args
        .get_one::<Shell>("shell")
        .ok_or_else(|| DrError::BadArguments("--shell needed".to_string()))?;
    let mut cmd = cli::droidreach();
    let cmd_name = cmd.get_name().to_string();
    generate(generator, &mut cmd, cmd_name, &mut io::stdout());
    Ok(())
}
