use droidreach::prelude::DrResult;
use droidreach::{cli, dr_callgraph};

fn main() -> DrResult<()> {
    let args = cli::callgraph().get_matches();
    dr_callgraph::run(&args)
}
