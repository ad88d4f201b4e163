//! Whole application analysis: model construction, parallel resolution of
//! every invocation and call tree assembly.

use crate::app::{AppManifest, Layouts};
use crate::backward::invocations;
use crate::calltree::CallTree;
use crate::components::{ComponentType, Components};
use crate::errors::AnalysisResult;
use crate::hierarchy::Hierarchy;
use crate::resolvers::{self, CallEdge, CallSite, Context, EdgeKind, Resolver, ResolverConfig};
use crate::usage::{self, Relation, UsageCache, UsageIndex};
use dr_bytecode::{ClassDef, MethodDef, MethodDescr};
use rayon::prelude::*;
use std::collections::BTreeSet;

pub struct Analysis {
    hierarchy: Hierarchy,
    components: Components,
    manifest: AppManifest,
    layouts: Layouts,
    usage: UsageIndex,
    cache: UsageCache,
    relations: Vec<Relation>,
    config: ResolverConfig,
}

impl Analysis {
    /// Builds the application model: closed class hierarchy, discovered
    /// components and the hosting relations revealed by class usages.
    #[must_use]
    pub fn new(
        classes: Vec<ClassDef>,
        manifest: AppManifest,
        layouts: Layouts,
        config: ResolverConfig,
    ) -> Self {
        let mut hierarchy = Hierarchy::new();
        for class in classes {
            hierarchy.add(class);
        }
        hierarchy.close();
        log::info!(
            "{} classes in hierarchy ({} from application)",
            hierarchy.nb_classes(),
            hierarchy.iter_app_classes().count()
        );

        let components = Components::discover(&hierarchy);
        let usage = UsageIndex::build(&hierarchy);
        let relations = usage::relations(&hierarchy, &usage, &components);
        let nb = usage::apply_relations(&relations, &components);
        log::info!("{nb} hosting relations found from class usages");

        Self {
            hierarchy,
            components,
            manifest,
            layouts,
            usage,
            cache: UsageCache::new(),
            relations,
            config,
        }
    }

    #[inline]
    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    #[inline]
    pub fn components(&self) -> &Components {
        &self.components
    }

    #[inline]
    pub fn manifest(&self) -> &AppManifest {
        &self.manifest
    }

    /// Relations found between components from class usages, unsupported
    /// ones included.
    #[inline]
    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn context(&self) -> Context {
        Context {
            hierarchy: &self.hierarchy,
            components: &self.components,
            layouts: &self.layouts,
            usage: &self.usage,
            cache: &self.cache,
            config: self.config,
        }
    }

    fn methods(&self) -> Vec<(&ClassDef, &MethodDef)> {
        self.hierarchy
            .iter_app_classes()
            .flat_map(|class| {
                class
                    .iter_methods()
                    .filter(|m| m.code().is_some())
                    .map(move |m| (class, m))
            })
            .collect()
    }

    /// Static edges of every application method, then the edges of each
    /// resolver in turn. Resolvers run one after the other, so that a
    /// resolver sees the component updates of the previous ones; each of
    /// them runs over all the methods in parallel.
    pub fn resolve_edges(&self, resolvers: &[Box<dyn Resolver>]) -> BTreeSet<CallEdge> {
        let methods = self.methods();
        let ctx = self.context();

        let mut edges: BTreeSet<CallEdge> = methods
            .par_iter()
            .flat_map_iter(|(_, method)| static_edges(method))
            .collect();
        log::info!(
            "{} static edges from {} methods",
            edges.len(),
            methods.len()
        );

        for resolver in resolvers {
            let found: Vec<CallEdge> = methods
                .par_iter()
                .flat_map_iter(|(class, method)| {
                    resolve_method(resolver.as_ref(), &ctx, class, method)
                })
                .collect();
            log::info!("{} resolver: {} edges", resolver.name(), found.len());
            edges.extend(found);
        }
        edges
    }

    /// Folds the edges into a call tree rooted at the main activity.
    ///
    /// # Errors
    ///
    /// Fails when the manifest declares no main activity.
    pub fn call_tree(&self, edges: &BTreeSet<CallEdge>) -> AnalysisResult<CallTree> {
        let main = self.manifest.main_activity()?;
        if !self.components.is_a(&main, ComponentType::Activity) {
            log::warn!("main activity {main} is not a known activity");
        }

        let mut tree = CallTree::new();
        tree.add_root_edge(&MethodDescr::default_constructor(&main));
        for edge in edges {
            tree.add_edge(edge);
        }
        let nb = tree.add_lifecycle_edges(&self.hierarchy, &self.components);
        log::info!(
            "call tree: {} vertices, {} edges ({} synthetic, {nb} from lifecycles)",
            tree.nb_vertices(),
            tree.nb_edges(),
            tree.nb_synthetic_edges()
        );
        Ok(tree)
    }

    /// Runs every resolver and builds the call tree.
    ///
    /// # Errors
    ///
    /// Fails when the manifest declares no main activity.
    pub fn run(&self) -> AnalysisResult<CallTree> {
        let edges = self.resolve_edges(&resolvers::all());
        self.call_tree(&edges)
    }
}

fn static_edges(method: &MethodDef) -> Vec<CallEdge> {
    let Some(code) = method.code() else {
        return Vec::new();
    };
    invocations(code)
        .map(|(_, _, _, target)| CallEdge {
            source: method.descriptor.clone(),
            target: target.clone(),
            kind: EdgeKind::Static,
        })
        .collect()
}

fn resolve_method(
    resolver: &dyn Resolver,
    ctx: &Context,
    class: &ClassDef,
    method: &MethodDef,
) -> Vec<CallEdge> {
    let Some(code) = method.code() else {
        return Vec::new();
    };
    let mut edges = Vec::new();
    for (index, _, _, target) in invocations(code) {
        if !resolver.recognizes(target) {
            continue;
        }
        let Some(site) = CallSite::new(class, method, index) else {
            continue;
        };
        let resolved = resolver.resolve(&site, ctx);
        log::trace!(
            "{}@{index}: {} resolved {target} to {} methods",
            method.descriptor,
            resolver.name(),
            resolved.len()
        );
        edges.extend(resolved.into_iter().map(|callee| CallEdge {
            source: method.descriptor.clone(),
            target: callee,
            kind: resolver.edge_kind(),
        }));
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::tests::{const_class, const_string, invoke, move_result, new_instance};
    use crate::calltree::Vertex;
    use crate::errors::AnalysisError;
    use crate::hierarchy::tests::descr;
    use crate::resolvers::tests::code;
    use dr_bytecode::InvokeKind;

    const START_ACTIVITY: &str = "Landroid/app/Activity;->startActivity(Landroid/content/Intent;)V";
    const INTENT_INIT: &str =
        "Landroid/content/Intent;-><init>(Landroid/content/Context;Ljava/lang/Class;)V";
    const SET_ON_ERROR: &str = "Landroid/media/MediaPlayer;->setOnErrorListener(Landroid/media/MediaPlayer$OnErrorListener;)V";
    const LBM: &str = "androidx/localbroadcastmanager/content/LocalBroadcastManager";

    fn app() -> Vec<ClassDef> {
        vec![
            ClassDef::new("app/Main")
                .extends("android/app/Activity")
                .with_method(code(
                    "Lapp/Main;->onCreate(Landroid/os/Bundle;)V",
                    vec![
                        new_instance(1, "android/content/Intent"),
                        const_class(2, "app/Target"),
                        invoke(InvokeKind::Direct, &[1, 6, 2], INTENT_INIT),
                        invoke(InvokeKind::Virtual, &[6, 1], START_ACTIVITY),
                        new_instance(3, "app/Receiver"),
                        new_instance(4, "android/content/IntentFilter"),
                        const_string(5, "app.DONE"),
                        invoke(
                            InvokeKind::Direct,
                            &[4, 5],
                            "Landroid/content/IntentFilter;-><init>(Ljava/lang/String;)V",
                        ),
                        invoke(
                            InvokeKind::Virtual,
                            &[0, 3, 4],
                            &format!("L{LBM};->registerReceiver(Landroid/content/BroadcastReceiver;Landroid/content/IntentFilter;)V"),
                        ),
                    ],
                )),
            ClassDef::new("app/Target")
                .extends("android/app/Activity")
                .declaring("<init>()V")
                .declaring("onCreate(Landroid/os/Bundle;)V")
                .with_method(code(
                    "Lapp/Target;->onResume()V",
                    vec![
                        new_instance(1, "app/Listener"),
                        invoke(InvokeKind::Virtual, &[0, 1], SET_ON_ERROR),
                        new_instance(2, "android/content/Intent"),
                        const_string(3, "app.DONE"),
                        invoke(
                            InvokeKind::Virtual,
                            &[2, 3],
                            "Landroid/content/Intent;->setAction(Ljava/lang/String;)Landroid/content/Intent;",
                        ),
                        invoke(
                            InvokeKind::Virtual,
                            &[0, 2],
                            &format!("L{LBM};->sendBroadcast(Landroid/content/Intent;)Z"),
                        ),
                    ],
                )),
            ClassDef::new("app/Listener")
                .implements("android/media/MediaPlayer$OnErrorListener")
                .declaring("onError(Landroid/media/MediaPlayer;II)Z"),
            ClassDef::new("app/Receiver")
                .extends("android/content/BroadcastReceiver")
                .declaring("onReceive(Landroid/content/Context;Landroid/content/Intent;)V"),
            ClassDef::new("app/Orphan").with_method(code(
                "Lapp/Orphan;->unused()V",
                vec![
                    invoke(InvokeKind::Static, &[], "Lapp/Orphan;->helper()Ljava/lang/Object;"),
                    move_result(0),
                ],
            )),
        ]
    }

    fn analysis() -> Analysis {
        Analysis::new(
            app(),
            AppManifest::new("app").with_main_activity(".Main"),
            Layouts::new(),
            ResolverConfig::default(),
        )
    }

    #[test]
    fn resolved_edges() {
        let analysis = analysis();
        let edges = analysis.resolve_edges(&resolvers::all());
        let has = |src: &str, dst: &str, kind: EdgeKind| {
            edges.contains(&CallEdge {
                source: descr(src),
                target: descr(dst),
                kind,
            })
        };
        assert!(has(
            "Lapp/Main;->onCreate(Landroid/os/Bundle;)V",
            START_ACTIVITY,
            EdgeKind::Static
        ));
        assert!(has(
            "Lapp/Main;->onCreate(Landroid/os/Bundle;)V",
            "Lapp/Target;-><init>()V",
            EdgeKind::Synthetic("intent")
        ));
        assert!(has(
            "Lapp/Target;->onResume()V",
            "Lapp/Listener;->onError(Landroid/media/MediaPlayer;II)Z",
            EdgeKind::Synthetic("listener")
        ));
        assert!(has(
            "Lapp/Target;->onResume()V",
            "Lapp/Receiver;->onReceive(Landroid/content/Context;Landroid/content/Intent;)V",
            EdgeKind::Synthetic("broadcast")
        ));
        assert!(analysis
            .components()
            .get("app/Receiver")
            .is_some_and(|c| c.is_dynamic_receiver()));
    }

    #[test]
    fn call_tree_paths() {
        let analysis = analysis();
        let tree = analysis.run().unwrap();
        let on_error = descr("Lapp/Listener;->onError(Landroid/media/MediaPlayer;II)Z");
        let path = tree.shortest_path_from_root(&on_error).unwrap();
        let path: Vec<String> = path.iter().map(ToString::to_string).collect();
        assert_eq!(
            path,
            [
                "<root>",
                "Lapp/Main;-><init>()V",
                "Lapp/Main;->onCreate(Landroid/os/Bundle;)V",
                "Lapp/Target;-><init>()V",
                "Lapp/Target;->onResume()V",
                "Lapp/Listener;->onError(Landroid/media/MediaPlayer;II)Z",
            ]
        );

        // unreachable: no path, no panic
        let unused = descr("Lapp/Orphan;->unused()V");
        assert!(tree.contains(&unused));
        assert!(tree.shortest_path_from_root(&unused).is_none());
        assert!(!tree.reachable_from_root().contains(&unused));
        assert_eq!(
            tree.find(|m| m.definer() == "app/Orphan"),
            Some(&unused)
        );
        assert!(tree.incoming(&unused).is_empty());
        assert!(matches!(
            tree.outgoing(&unused).first(),
            Some((Vertex::Method(_), EdgeKind::Static))
        ));
    }

    #[test]
    fn missing_main_activity() {
        let analysis = Analysis::new(
            app(),
            AppManifest::new("app"),
            Layouts::new(),
            ResolverConfig::default(),
        );
        assert!(matches!(
            analysis.run(),
            Err(AnalysisError::MissingManifestEntry(_))
        ));
    }
}
