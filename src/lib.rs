//! # `DroidReach`
//!
//! `droidreach` is the main crate of the `DroidReach` project, which
//! reconstructs the call tree of an Android application from its
//! disassembled bytecode, including the calls made by the framework on
//! behalf of the application, and answers reachability queries on it.
//!
//! The input is a JSON bundle produced by an external disassembler: the
//! application classes (with their per-method instruction graphs), the
//! relevant manifest entries and the fragments declared in layouts.
//!
//! ```rust
//! use droidreach::prelude::*;
//!
//! let bundle = Bundle::from_reader(r#"{
//!     "manifest": { "package": "app", "main_activity": ".Main" },
//!     "classes": [
//!         { "name": "app/Main", "superclass": "android/app/Activity" }
//!     ]
//! }"#.as_bytes())?;
//! let analysis = bundle.into_analysis(ResolverConfig::default());
//! let tree = analysis.run()?;
//! assert_eq!(tree.nb_vertices(), 2);
//! # Ok::<(), DrError>(())
//! ```
//!
//! ## Sub-crates
//!
//!  - [`dr_bytecode`] contains the read model of the disassembled bytecode
//!    (descriptors, instructions, instruction graphs, class definitions),
//!  - [`dr_analysis`] contains the analysis algorithms: classes hierarchy,
//!    backward register resolution, components, heuristic resolvers and
//!    the call tree.

mod errors;

pub mod bundle;
pub mod cli;
pub mod dr_callgraph;
pub mod dr_components;
pub mod dr_hierarchy;
pub mod dr_path;

pub use dr_analysis as analysis;
pub use dr_bytecode as bytecode;

/// Reexport module of commonly used structures and functions from
/// `DroidReach` project sub-crates:
///
/// ```rust
/// use droidreach::prelude::*;
/// ```
pub mod prelude {
    pub use crate::bundle::Bundle;
    pub use crate::errors::{DrError, DrResult};

    pub use dr_analysis::{
        Analysis, AppManifest, CallTree, ComponentType, DispatchPolicy, EdgeKind, Hierarchy,
        Layouts, ResolverConfig, Vertex,
    };

    pub use dr_bytecode::{ClassDef, MethodDescr};

    use clap::ArgMatches;

    pub fn init_logger(args: &ArgMatches) {
        let env = env_logger::Env::new()
            .filter_or("DR_LOG", "info")
            .write_style("DR_LOG_STYLE");

        let mut builder = env_logger::Builder::from_env(env);
        if args.get_flag("verbose") {
            builder.filter_level(log::LevelFilter::Trace);
        } else if args.get_flag("debug") {
            builder.filter_level(log::LevelFilter::Debug);
        }
        if args.get_flag("ecslog") {
            builder.format(ecs_logger::format);
        }
        builder.init();
    }
}
