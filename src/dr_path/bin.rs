use droidreach::prelude::DrResult;
use droidreach::{cli, dr_path};

fn main() -> DrResult<()> {
    let args = cli::path().get_matches();
    dr_path::run(&args)
}
