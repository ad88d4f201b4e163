use crate::bundle::{self, Filter};
use crate::prelude::*;
use clap::ArgMatches;
use dr_analysis::{resolvers, ComponentId, Relation};

fn parse_type(value: &str) -> DrResult<ComponentType> {
    match value {
        "activity" => Ok(ComponentType::Activity),
        "fragment" => Ok(ComponentType::Fragment),
        "service" => Ok(ComponentType::Service),
        "receiver" => Ok(ComponentType::Receiver),
        "binder" => Ok(ComponentType::Binder),
        _ => Err(DrError::BadArguments(format!(
            "unknown component type '{value}'"
        ))),
    }
}

/// Components sorted by role then name, each followed by its hosting
/// relations.
fn component_lines(
    analysis: &Analysis,
    type_: Option<ComponentType>,
    filter: &Filter,
) -> Vec<String> {
    let components = analysis.components();
    let name_of = |id: ComponentId| components.read(id).map(|c| c.name().to_string());

    let mut snapshot = components.snapshot();
    snapshot.retain(|c| type_.map_or(true, |t| c.type_() == t) && filter.is_class_match(c.name()));
    snapshot.sort_by(|a, b| (a.type_(), a.name()).cmp(&(b.type_(), b.name())));

    let mut lines = Vec::new();
    for component in snapshot {
        lines.push(component.to_string());
        for fragment in component.fragments().into_iter().filter_map(name_of) {
            lines.push(format!("  hosts {fragment}"));
        }
        if component.type_() == ComponentType::Fragment {
            let hosts = components
                .get_id(component.name())
                .map(|id| components.hosts_of(id))
                .unwrap_or_default();
            for host in hosts.into_iter().filter_map(name_of) {
                lines.push(format!("  hosted by {host}"));
            }
        }
    }
    lines
}

pub fn run(args: &ArgMatches) -> DrResult<()> {
    init_logger(args);

    let analysis = bundle::load(args)?;
    let type_ = args
        .get_one::<String>("type")
        .map(|t| parse_type(t))
        .transpose()?;
    let filter = Filter::from_args(args)?;

    // resolvers update components records (hosted fragments, services usage)
    let edges = analysis.resolve_edges(&resolvers::all());
    log::debug!("{} edges resolved", edges.len());

    for line in component_lines(&analysis, type_, &filter) {
        println!("{line}");
    }

    let unsupported: Vec<&Relation> = analysis
        .relations()
        .iter()
        .filter(|r| matches!(r, Relation::Unsupported { .. }))
        .collect();
    if !unsupported.is_empty() {
        log::warn!("{} unsupported component relations", unsupported.len());
        for relation in unsupported {
            println!("{relation}");
        }
    }
    Ok(())
}
