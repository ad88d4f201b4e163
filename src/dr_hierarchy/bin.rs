use droidreach::prelude::DrResult;
use droidreach::{cli, dr_hierarchy};

fn main() -> DrResult<()> {
    let args = cli::hierarchy().get_matches();
    dr_hierarchy::run(&args)
}
