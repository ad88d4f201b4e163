//! This crate provides the call graph reconstruction algorithms of the
//! `DroidReach` project: classes hierarchy and virtual dispatch, backward
//! register resolution, Android components model and the heuristic
//! resolvers that recover the calls made by the framework on behalf of the
//! application (listeners, threads, intents, broadcasts, fragments...).
//!
//! ```rust
//! use dr_analysis::{Analysis, AppManifest, Layouts, ResolverConfig};
//! use dr_bytecode::{ClassDef, MethodDescr};
//!
//! let classes = vec![ClassDef::new("app/Main")
//!     .extends("android/app/Activity")
//!     .declaring("onCreate(Landroid/os/Bundle;)V")];
//! let analysis = Analysis::new(
//!     classes,
//!     AppManifest::new("app").with_main_activity("app.Main"),
//!     Layouts::new(),
//!     ResolverConfig::default(),
//! );
//! let tree = analysis.run().unwrap();
//! let on_create: MethodDescr = "Lapp/Main;->onCreate(Landroid/os/Bundle;)V".parse().unwrap();
//! assert_eq!(tree.shortest_path_from_root(&on_create).map(|p| p.len()), Some(3));
//! ```

pub mod analysis;
pub mod app;
pub mod backward;
pub mod calltree;
pub mod components;
pub mod errors;
pub mod hierarchy;
pub mod resolvers;
pub mod usage;

pub use analysis::Analysis;
pub use app::{AppManifest, Layouts};
pub use calltree::{CallTree, Vertex};
pub use components::{Component, ComponentId, ComponentKind, ComponentType, Components};
pub use errors::{AnalysisError, AnalysisResult};
pub use hierarchy::{DispatchPolicy, Hierarchy};
pub use resolvers::{CallEdge, EdgeKind, Resolver, ResolverConfig};
pub use usage::{Relation, UsageCache, UsageIndex};
