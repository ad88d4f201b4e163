use crate::bundle::{self, Filter};
use crate::prelude::*;
use clap::ArgMatches;
use dr_analysis::AnalysisError;
use dr_analysis::hierarchy::Link;
use std::collections::BTreeSet;

fn join(names: &BTreeSet<String>) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Hierarchy relations of a single class.
fn class_report(analysis: &Analysis, name: &str) -> DrResult<Vec<String>> {
    let hierarchy = analysis.hierarchy();
    let node = hierarchy
        .get(name)
        .ok_or_else(|| AnalysisError::ClassNotFound(name.to_string()))?;

    let mut lines = vec![match node.definition() {
        Some(def) if def.system => format!("{name} (system)"),
        Some(_) => name.to_string(),
        None => format!("{name} (missing)"),
    }];
    let superclasses = hierarchy.superclasses(name);
    lines.push(format!(
        "  superclasses: {}",
        if superclasses.is_empty() {
            "-".to_string()
        } else {
            superclasses.join(" -> ")
        }
    ));
    lines.push(format!("  interfaces:   {}", join(&hierarchy.interfaces(name))));
    lines.push(format!("  supertypes:   {}", join(&hierarchy.all_supertypes(name))));
    lines.push(format!("  subclasses:   {}", join(&hierarchy.subclasses(name))));
    lines.push(format!("  implementers: {}", join(&hierarchy.implementers(name))));
    lines.push(format!("  inner:        {}", join(&hierarchy.inner_classes(name))));
    if let Some(outer) = hierarchy.outer_class(name) {
        lines.push(format!("  outer:        {outer}"));
    }
    if let Some(type_) = analysis.components().type_of(name) {
        lines.push(format!("  component:    {type_}"));
    }
    Ok(lines)
}

fn missing_classes<'a>(hierarchy: &'a Hierarchy, filter: &Filter) -> Vec<&'a str> {
    let mut res: Vec<&str> = hierarchy
        .iter_missing_classes()
        .filter(|name| filter.is_class_match(name))
        .collect();
    res.sort_unstable();
    res
}

fn app_classes(hierarchy: &Hierarchy, filter: &Filter) -> Vec<String> {
    let mut res: Vec<String> = hierarchy
        .iter_app_classes()
        .filter(|class| filter.is_class_match(&class.name))
        .map(|class| match hierarchy.superclass(&class.name) {
            Some(sup) => format!("{} {} {sup}", class.name, Link::Extends),
            None => class.name.clone(),
        })
        .collect();
    res.sort();
    res
}

pub fn run(args: &ArgMatches) -> DrResult<()> {
    init_logger(args);

    let analysis = bundle::load(args)?;
    let filter = Filter::from_args(args)?;

    if args.get_flag("missing") {
        let missing = missing_classes(analysis.hierarchy(), &filter);
        for name in &missing {
            println!("{name}");
        }
        log::info!("{} classes referenced but not defined", missing.len());
    } else if let Some(name) = args.get_one::<String>("class") {
        for line in class_report(&analysis, name)? {
            println!("{line}");
        }
    } else {
        for line in app_classes(analysis.hierarchy(), &filter) {
            println!("{line}");
        }
    }
    Ok(())
}
