use crate::bundle::{self, Filter};
use crate::prelude::*;
use clap::ArgMatches;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};

#[derive(Debug, Serialize)]
struct JsonEdge {
    source: String,
    target: String,
    #[serde(flatten)]
    kind: EdgeKind,
}

fn json_edges(tree: &CallTree) -> Vec<JsonEdge> {
    tree.edges()
        .map(|(source, target, kind)| JsonEdge {
            source: source.to_string(),
            target: target.to_string(),
            kind,
        })
        .collect()
}

pub fn run(args: &ArgMatches) -> DrResult<()> {
    init_logger(args);

    let analysis = bundle::load(args)?;
    let filter = Filter::from_args(args)?;
    let tree = if filter.is_empty() {
        analysis.run()?
    } else {
        analysis.run()?.filter(|m| filter.is_match(m))
    };

    log::info!(
        "call tree contains {} methods with:",
        tree.nb_vertices().saturating_sub(1)
    );
    log::info!("    - {} static calls", tree.nb_edges_of(EdgeKind::Static));
    log::info!(
        "    - {} overriding calls",
        tree.nb_edges_of(EdgeKind::VirtualOverride)
    );
    log::info!("    - {} synthetic calls", tree.nb_synthetic_edges());
    log::info!(
        "    - {} methods reachable from entry point",
        tree.reachable_from_root().len()
    );

    if let Some(json_filename) = args.get_one::<String>("output") {
        let mut file = BufWriter::new(File::create(json_filename)?);
        serde_json::to_writer_pretty(&mut file, &json_edges(&tree))?;
        file.flush()?;
        log::info!("json output written in {:?}", json_filename);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_analysis::resolvers::CallEdge;

    #[test]
    fn edges_json_form() {
        let mut tree = CallTree::new();
        tree.add_root_edge(&MethodDescr::default_constructor("app/Main"));
        tree.add_edge(&CallEdge {
            source: MethodDescr::default_constructor("app/Main"),
            target: "Lapp/Main;->run()V".parse().unwrap(),
            kind: EdgeKind::Synthetic("thread"),
        });
        let json = serde_json::to_value(json_edges(&tree)).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {
                    "source": "<root>",
                    "target": "Lapp/Main;-><init>()V",
                    "kind": "synthetic",
                    "origin": "root"
                },
                {
                    "source": "Lapp/Main;-><init>()V",
                    "target": "Lapp/Main;->run()V",
                    "kind": "synthetic",
                    "origin": "thread"
                }
            ])
        );
    }
}
