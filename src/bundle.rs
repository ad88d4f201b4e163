//! Analysis input: the JSON bundle produced by the disassembler, and the
//! options shared by every subcommand.

use crate::prelude::*;
use clap::ArgMatches;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Disassembled application.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Bundle {
    pub manifest: AppManifest,
    #[serde(default)]
    pub layouts: Layouts,
    #[serde(default)]
    pub classes: Vec<ClassDef>,
}

impl Bundle {
    pub fn open<P: AsRef<Path>>(path: P) -> DrResult<Self> {
        let file = File::open(path.as_ref())?;
        log::debug!("reading bundle {:?}", path.as_ref());
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> DrResult<Self> {
        let bundle: Self = serde_json::from_reader(reader)?;
        log::info!(
            "bundle of package {} loaded: {} classes, {} layouts",
            bundle.manifest.package,
            bundle.classes.len(),
            bundle.layouts.len()
        );
        Ok(bundle)
    }

    /// Adds the classes of a system (framework, libraries) classes file, a
    /// JSON array of class definitions. Returns the number of added classes.
    pub fn add_system_classes<P: AsRef<Path>>(&mut self, path: P) -> DrResult<usize> {
        let file = File::open(path.as_ref())?;
        let classes: Vec<ClassDef> = serde_json::from_reader(BufReader::new(file))?;
        let nb = classes.len();
        self.classes.extend(classes.into_iter().map(ClassDef::system));
        log::info!("{nb} system classes loaded from {:?}", path.as_ref());
        Ok(nb)
    }

    #[must_use]
    pub fn into_analysis(self, config: ResolverConfig) -> Analysis {
        Analysis::new(self.classes, self.manifest, self.layouts, config)
    }
}

/// Resolution options given on the command line.
pub fn config(args: &ArgMatches) -> ResolverConfig {
    let mut config = ResolverConfig::default();
    config.policy.app_only = args.get_flag("app-only");
    if let Some(depth) = args.get_one::<usize>("usage-depth") {
        config.usage_depth = *depth;
    }
    config
}

/// Loads the `--input` bundle (and the `--system` classes, if any) and builds
/// the application model.
pub fn load(args: &ArgMatches) -> DrResult<Analysis> {
    let input_fname = args
        .get_one::<String>("input")
        .ok_or_else(|| DrError::BadArguments("--input needed".to_string()))?;
    let mut bundle = Bundle::open(input_fname)?;
    if let Some(system_fname) = args.get_one::<String>("system") {
        bundle.add_system_classes(system_fname)?;
    }
    Ok(bundle.into_analysis(config(args)))
}

/// Regex filters on methods definer class and name.
#[derive(Debug, Default)]
pub struct Filter {
    class: Option<Regex>,
    method: Option<Regex>,
}

impl Filter {
    pub fn new(class: Option<&str>, method: Option<&str>) -> DrResult<Self> {
        Ok(Self {
            class: class.map(Regex::new).transpose()?,
            method: method.map(Regex::new).transpose()?,
        })
    }

    pub fn from_args(args: &ArgMatches) -> DrResult<Self> {
        let filter = Self::new(
            args.get_one::<String>("filter-class").map(String::as_str),
            args.get_one::<String>("filter-method").map(String::as_str),
        )?;
        if !filter.is_empty() {
            log::debug!(
                "filtering on class pattern {:?}, method pattern {:?}",
                filter.class,
                filter.method
            );
        }
        Ok(filter)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.class.is_none() && self.method.is_none()
    }

    #[must_use]
    pub fn is_class_match(&self, class: &str) -> bool {
        self.class.as_ref().map_or(true, |re| re.is_match(class))
    }

    #[must_use]
    pub fn is_match(&self, method: &MethodDescr) -> bool {
        self.is_class_match(method.definer())
            && self
                .method
                .as_ref()
                .map_or(true, |re| re.is_match(method.name()))
    }
}

/// Parses a list of method descriptors given on the command line.
pub fn parse_methods<'a, I>(values: I) -> DrResult<Vec<MethodDescr>>
where
    I: IntoIterator<Item = &'a String>,
{
    values
        .into_iter()
        .map(|s| s.parse::<MethodDescr>().map_err(DrError::from))
        .collect()
}
