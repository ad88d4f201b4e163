use droidreach::prelude::DrResult;
use droidreach::{cli, dr_components};

fn main() -> DrResult<()> {
    let args = cli::components().get_matches();
    dr_components::run(&args)
}
