use crate::bundle::{self, Filter};
use crate::prelude::*;
use clap::ArgMatches;
use dr_analysis::AnalysisError;
use nu_ansi_term::{Color, Style};

fn paint_kind(kind: EdgeKind) -> String {
    let style = match kind {
        EdgeKind::Static => Style::new(),
        EdgeKind::VirtualOverride => Color::Yellow.normal(),
        EdgeKind::Synthetic(_) => Color::Blue.normal(),
    };
    style.paint(kind.to_string()).to_string()
}

fn check_known(tree: &CallTree, method: &MethodDescr) -> DrResult<()> {
    if tree.contains(method) {
        Ok(())
    } else {
        Err(AnalysisError::MethodNotFound(method.to_string()).into())
    }
}

/// One line per call of the path, with the kinds of the edges used.
fn format_path(tree: &CallTree, path: &[&Vertex]) -> Vec<String> {
    let mut lines = Vec::new();
    let Some(first) = path.first() else {
        return lines;
    };
    lines.push(Style::new().bold().paint(first.to_string()).to_string());
    for pair in path.windows(2) {
        let kinds: Vec<String> = tree
            .edge_kinds(pair[0], pair[1])
            .into_iter()
            .map(paint_kind)
            .collect();
        lines.push(format!("  -[{}]-> {}", kinds.join("|"), pair[1]));
    }
    lines
}

pub fn run(args: &ArgMatches) -> DrResult<()> {
    init_logger(args);

    let analysis = bundle::load(args)?;
    let tree = analysis.run()?;

    let path = if args.get_flag("find") {
        let filter = Filter::from_args(args)?;
        if filter.is_empty() {
            return Err(DrError::BadArguments(
                "--find needs --filter-class or --filter-method".to_string(),
            ));
        }
        let Some(target) = tree.find(|m| filter.is_match(m)) else {
            log::warn!("no method of the call tree matches the filters");
            return Ok(());
        };
        log::info!("first matching method: {target}");
        tree.shortest_path_from_root(target)
    } else {
        let targets = bundle::parse_methods(args.get_many::<String>("to").into_iter().flatten())?;
        for target in &targets {
            check_known(&tree, target)?;
        }
        match args.get_one::<String>("from") {
            Some(from) => {
                let from: MethodDescr = from.parse()?;
                check_known(&tree, &from)?;
                let [to] = targets.as_slice() else {
                    return Err(DrError::BadArguments(
                        "--from expects a single --to method".to_string(),
                    ));
                };
                tree.shortest_path(&from, to)
            }
            None => tree.shortest_path_through(&targets),
        }
    };

    match path {
        Some(path) => {
            for line in format_path(&tree, &path) {
                println!("{line}");
            }
            log::info!("path of {} calls", path.len().saturating_sub(1));
        }
        None => println!("no path found"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_analysis::CallEdge;

    #[test]
    fn path_lines() {
        let main = MethodDescr::default_constructor("app/Main");
        let run: MethodDescr = "Lapp/Main;->run()V".parse().unwrap();
        let mut tree = CallTree::new();
        tree.add_root_edge(&main);
        for kind in [EdgeKind::Static, EdgeKind::Synthetic("thread")] {
            tree.add_edge(&CallEdge {
                source: main.clone(),
                target: run.clone(),
                kind,
            });
        }
        let path = tree.shortest_path_from_root(&run).unwrap();
        let lines = format_path(&tree, &path);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("<root>"));
        assert!(lines[1].contains("synthetic:root"));
        assert!(lines[2].ends_with("-> Lapp/Main;->run()V"));
        assert!(lines[2].contains("static|"));
        assert!(lines[2].contains("synthetic:thread"));
        assert!(format_path(&tree, &[]).is_empty());
        assert!(check_known(&tree, &run).is_ok());
        assert!(matches!(
            check_known(&tree, &"Lapp/Main;->stop()V".parse().unwrap()),
            Err(DrError::Analysis(AnalysisError::MethodNotFound(_)))
        ));
    }
}
