//! Android components (activities, fragments, services, broadcast receivers
//! and binders) of the analyzed application.
//!
//! Components are discovered once from the classes hierarchy, then resolvers
//! update them in place as relations are found (hosted fragments, started or
//! bound services, dynamic receivers). Each record sits behind its own lock
//! so that resolvers running in parallel only contend on the very component
//! they update.

use crate::hierarchy::Hierarchy;
use dr_bytecode::MethodDescr;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};

pub const ACTIVITY_CLASSES: &[&str] = &[
    "android/app/Activity",
    "android/app/ListActivity",
    "android/app/NativeActivity",
    "android/preference/PreferenceActivity",
    "android/support/v4/app/FragmentActivity",
    "android/support/v7/app/AppCompatActivity",
    "androidx/activity/ComponentActivity",
    "androidx/appcompat/app/AppCompatActivity",
    "androidx/core/app/ComponentActivity",
    "androidx/fragment/app/FragmentActivity",
];

pub const FRAGMENT_CLASSES: &[&str] = &[
    "android/app/DialogFragment",
    "android/app/Fragment",
    "android/app/ListFragment",
    "android/preference/PreferenceFragment",
    "android/support/v4/app/DialogFragment",
    "android/support/v4/app/Fragment",
    "androidx/fragment/app/DialogFragment",
    "androidx/fragment/app/Fragment",
    "androidx/preference/PreferenceFragmentCompat",
];

pub const SERVICE_CLASSES: &[&str] = &[
    "android/app/IntentService",
    "android/app/Service",
    "android/app/job/JobService",
    "android/support/v4/app/JobIntentService",
    "androidx/core/app/JobIntentService",
];

pub const RECEIVER_CLASSES: &[&str] = &["android/content/BroadcastReceiver"];

pub const BINDER_CLASSES: &[&str] = &["android/os/Binder"];

const ACTIVITY_CALLBACKS: &[&str] = &[
    "onCreate",
    "onStart",
    "onRestart",
    "onResume",
    "onPause",
    "onStop",
    "onDestroy",
    "onNewIntent",
    "onActivityResult",
    "onSaveInstanceState",
    "onRestoreInstanceState",
    "onCreateOptionsMenu",
    "onOptionsItemSelected",
    "onBackPressed",
    "onRequestPermissionsResult",
];

const FRAGMENT_CALLBACKS: &[&str] = &[
    "onAttach",
    "onCreate",
    "onCreateView",
    "onViewCreated",
    "onActivityCreated",
    "onStart",
    "onResume",
    "onPause",
    "onStop",
    "onDestroyView",
    "onDestroy",
    "onDetach",
    "onCreateDialog",
];

const SERVICE_CALLBACKS: &[&str] = &[
    "onCreate",
    "onStartCommand",
    "onStart",
    "onBind",
    "onRebind",
    "onUnbind",
    "onDestroy",
    "onHandleIntent",
    "onStartJob",
    "onStopJob",
    "onHandleWork",
];

const RECEIVER_CALLBACKS: &[&str] = &["onReceive"];

const BINDER_CALLBACKS: &[&str] = &["onTransact"];

/// Arena index of a component.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct ComponentId(NonZeroUsize);

impl ComponentId {
    fn from_idx(idx: usize) -> Self {
        Self(NonZeroUsize::MIN.saturating_add(idx))
    }

    fn idx(self) -> usize {
        self.0.get() - 1
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Role of a component, without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentType {
    Activity,
    Fragment,
    Service,
    Receiver,
    Binder,
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Activity => write!(f, "activity"),
            Self::Fragment => write!(f, "fragment"),
            Self::Service => write!(f, "service"),
            Self::Receiver => write!(f, "receiver"),
            Self::Binder => write!(f, "binder"),
        }
    }
}

impl ComponentType {
    /// Framework base classes of this role.
    #[must_use]
    pub const fn base_classes(self) -> &'static [&'static str] {
        match self {
            Self::Activity => ACTIVITY_CLASSES,
            Self::Fragment => FRAGMENT_CLASSES,
            Self::Service => SERVICE_CLASSES,
            Self::Receiver => RECEIVER_CLASSES,
            Self::Binder => BINDER_CLASSES,
        }
    }

    /// Names of the methods called by the framework along the component
    /// lifecycle.
    #[must_use]
    pub const fn lifecycle_callbacks(self) -> &'static [&'static str] {
        match self {
            Self::Activity => ACTIVITY_CALLBACKS,
            Self::Fragment => FRAGMENT_CALLBACKS,
            Self::Service => SERVICE_CALLBACKS,
            Self::Receiver => RECEIVER_CALLBACKS,
            Self::Binder => BINDER_CALLBACKS,
        }
    }

    const ALL: [Self; 5] = [
        Self::Activity,
        Self::Fragment,
        Self::Service,
        Self::Receiver,
        Self::Binder,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentKind {
    Activity {
        fragments: BTreeSet<ComponentId>,
    },
    Fragment,
    Service {
        started: bool,
        bound: bool,
        connection: Option<String>,
    },
    Receiver {
        dynamic: bool,
        action: Option<String>,
    },
    Binder,
}

impl ComponentKind {
    #[must_use]
    pub fn new(type_: ComponentType) -> Self {
        match type_ {
            ComponentType::Activity => Self::Activity {
                fragments: BTreeSet::new(),
            },
            ComponentType::Fragment => Self::Fragment,
            ComponentType::Service => Self::Service {
                started: false,
                bound: false,
                connection: None,
            },
            ComponentType::Receiver => Self::Receiver {
                dynamic: false,
                action: None,
            },
            ComponentType::Binder => Self::Binder,
        }
    }

    #[must_use]
    pub const fn type_(&self) -> ComponentType {
        match self {
            Self::Activity { .. } => ComponentType::Activity,
            Self::Fragment => ComponentType::Fragment,
            Self::Service { .. } => ComponentType::Service,
            Self::Receiver { .. } => ComponentType::Receiver,
            Self::Binder => ComponentType::Binder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    name: String,
    constructor: MethodDescr,
    pub kind: ComponentKind,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.kind.type_(), self.name)?;
        match &self.kind {
            ComponentKind::Service {
                started,
                bound,
                connection,
            } => {
                if *started {
                    write!(f, " [started]")?;
                }
                if *bound {
                    write!(f, " [bound")?;
                    if let Some(conn) = connection {
                        write!(f, " via {conn}")?;
                    }
                    write!(f, "]")?;
                }
            }
            ComponentKind::Receiver { dynamic, action } => {
                if *dynamic {
                    write!(f, " [dynamic]")?;
                }
                if let Some(action) = action {
                    write!(f, " [{action}]")?;
                }
            }
            _ => (),
        }
        Ok(())
    }
}

impl Component {
    #[must_use]
    pub fn new(name: &str, type_: ComponentType) -> Self {
        Self {
            name: name.to_string(),
            constructor: MethodDescr::default_constructor(name),
            kind: ComponentKind::new(type_),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default constructor descriptor, the call target of the framework when
    /// it instantiates the component.
    #[inline]
    pub fn constructor(&self) -> &MethodDescr {
        &self.constructor
    }

    #[inline]
    pub fn type_(&self) -> ComponentType {
        self.kind.type_()
    }

    #[inline]
    pub fn is_activity(&self) -> bool {
        matches!(self.kind, ComponentKind::Activity { .. })
    }

    /// Fragments hosted by an activity (empty for other components).
    #[must_use]
    pub fn fragments(&self) -> BTreeSet<ComponentId> {
        match &self.kind {
            ComponentKind::Activity { fragments } => fragments.clone(),
            _ => BTreeSet::new(),
        }
    }

    /// Action of a receiver, if known.
    #[must_use]
    pub fn action(&self) -> Option<&str> {
        match &self.kind {
            ComponentKind::Receiver { action, .. } => action.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_dynamic_receiver(&self) -> bool {
        matches!(self.kind, ComponentKind::Receiver { dynamic: true, .. })
    }
}

/// Arena of the components of an application.
#[derive(Debug, Default)]
pub struct Components {
    records: Vec<RwLock<Component>>,
    ids: BTreeMap<String, ComponentId>,
}

impl Components {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies the application classes of the hierarchy according to the
    /// framework base class found in their superclass chain.
    #[must_use]
    pub fn discover(hierarchy: &Hierarchy) -> Self {
        let mut components = Self::new();
        for class in hierarchy.iter_app_classes() {
            let found = ComponentType::ALL.iter().find_map(|type_| {
                hierarchy
                    .extends_any(&class.name, type_.base_classes())
                    .map(|base| (*type_, base))
            });
            if let Some((type_, base)) = found {
                if type_.base_classes().contains(&class.name.as_str()) {
                    continue;
                }
                log::trace!("{} discovered as {type_} (extends {base})", class.name);
                components.insert(&class.name, type_);
            }
        }
        log::info!("{} components discovered", components.len());
        components
    }

    /// Registers a component, or returns the id of the already registered
    /// one with the same name.
    pub fn insert(&mut self, name: &str, type_: ComponentType) -> ComponentId {
        if let Some(id) = self.ids.get(name) {
            log::warn!("component {name} has already been registered");
            return *id;
        }
        let id = ComponentId::from_idx(self.records.len());
        self.records.push(RwLock::new(Component::new(name, type_)));
        self.ids.insert(name.to_string(), id);
        id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn get_id(&self, name: &str) -> Option<ComponentId> {
        self.ids.get(name).copied()
    }

    /// Read access to a component record.
    pub fn read(&self, id: ComponentId) -> Option<RwLockReadGuard<'_, Component>> {
        self.records
            .get(id.idx())
            .map(|c| c.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Snapshot of a component, by class name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Component> {
        self.read(self.get_id(name)?).map(|c| c.clone())
    }

    /// Role of the component defined by a class, if any.
    #[must_use]
    pub fn type_of(&self, name: &str) -> Option<ComponentType> {
        self.read(self.get_id(name)?).map(|c| c.type_())
    }

    #[must_use]
    pub fn is_a(&self, name: &str, type_: ComponentType) -> bool {
        self.type_of(name) == Some(type_)
    }

    /// Updates a component record in place, returning the closure result.
    pub fn update<F, R>(&self, id: ComponentId, f: F) -> Option<R>
    where
        F: FnOnce(&mut Component) -> R,
    {
        let record = self.records.get(id.idx())?;
        let mut guard = record.write().unwrap_or_else(PoisonError::into_inner);
        Some(f(&mut guard))
    }

    /// Records an activity hosting a fragment. Returns `false` when one of
    /// the two is not a component of the expected role.
    pub fn host_fragment(&self, activity: ComponentId, fragment: ComponentId) -> bool {
        if self.read(fragment).map(|c| c.type_()) != Some(ComponentType::Fragment) {
            return false;
        }
        self.update(activity, |c| match &mut c.kind {
            ComponentKind::Activity { fragments } => {
                fragments.insert(fragment);
                true
            }
            _ => false,
        })
        .unwrap_or(false)
    }

    /// Snapshots of all the components, in registration order.
    pub fn snapshot(&self) -> Vec<Component> {
        self.records
            .iter()
            .map(|c| c.read().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.ids.values().copied()
    }

    /// Ids of the components of a given role.
    pub fn ids_of(&self, type_: ComponentType) -> impl Iterator<Item = ComponentId> + '_ {
        self.ids()
            .filter(move |id| self.read(*id).is_some_and(|c| c.type_() == type_))
    }

    /// Activities hosting a fragment.
    pub fn hosts_of(&self, fragment: ComponentId) -> BTreeSet<ComponentId> {
        self.ids_of(ComponentType::Activity)
            .filter(|id| self.read(*id).is_some_and(|c| c.fragments().contains(&fragment)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dr_bytecode::ClassDef;

    fn hierarchy() -> Hierarchy {
        let mut h = Hierarchy::new();
        h.add(ClassDef::new("android/app/Activity").system());
        h.add(ClassDef::new("app/Base").extends("android/app/Activity"));
        h.add(ClassDef::new("app/Main").extends("app/Base"));
        h.add(ClassDef::new("app/Compat").extends("androidx/appcompat/app/AppCompatActivity"));
        h.add(ClassDef::new("app/Frag").extends("androidx/fragment/app/Fragment"));
        h.add(ClassDef::new("app/Sync").extends("android/app/IntentService"));
        h.add(ClassDef::new("app/Recv").extends("android/content/BroadcastReceiver"));
        h.add(ClassDef::new("app/Stub").extends("android/os/Binder"));
        h.add(ClassDef::new("app/Util"));
        h.close();
        h
    }

    #[test]
    fn discovery_by_superclass_chain() {
        let c = Components::discover(&hierarchy());
        assert_eq!(c.type_of("app/Main"), Some(ComponentType::Activity));
        assert_eq!(c.type_of("app/Base"), Some(ComponentType::Activity));
        assert_eq!(c.type_of("app/Compat"), Some(ComponentType::Activity));
        assert_eq!(c.type_of("app/Frag"), Some(ComponentType::Fragment));
        assert_eq!(c.type_of("app/Sync"), Some(ComponentType::Service));
        assert_eq!(c.type_of("app/Recv"), Some(ComponentType::Receiver));
        assert_eq!(c.type_of("app/Stub"), Some(ComponentType::Binder));
        assert_eq!(c.type_of("app/Util"), None);
        assert_eq!(c.type_of("android/app/Activity"), None);
        assert_eq!(c.len(), 7);
    }

    #[test]
    fn default_constructor() {
        let c = Components::discover(&hierarchy());
        let main = c.get("app/Main").unwrap();
        assert_eq!(main.constructor().to_string(), "Lapp/Main;-><init>()V");
    }

    #[test]
    fn update_in_place() {
        let c = Components::discover(&hierarchy());
        let sync = c.get_id("app/Sync").unwrap();
        c.update(sync, |s| {
            if let ComponentKind::Service { bound, connection, .. } = &mut s.kind {
                *bound = true;
                *connection = Some("app/Conn".to_string());
            }
        });
        assert_eq!(
            c.get("app/Sync").unwrap().kind,
            ComponentKind::Service {
                started: false,
                bound: true,
                connection: Some("app/Conn".to_string())
            }
        );
    }

    #[test]
    fn hosting_requires_roles() {
        let c = Components::discover(&hierarchy());
        let main = c.get_id("app/Main").unwrap();
        let frag = c.get_id("app/Frag").unwrap();
        let recv = c.get_id("app/Recv").unwrap();
        assert!(c.host_fragment(main, frag));
        assert!(!c.host_fragment(main, recv));
        assert!(!c.host_fragment(frag, frag));
        assert_eq!(c.hosts_of(frag), BTreeSet::from([main]));
    }

    #[test]
    fn insert_is_idempotent() {
        let mut c = Components::new();
        let a = c.insert("app/A", ComponentType::Activity);
        let b = c.insert("app/A", ComponentType::Service);
        assert_eq!(a, b);
        assert_eq!(c.len(), 1);
        assert!(c.is_a("app/A", ComponentType::Activity));
    }

    #[test]
    fn foreign_ids_are_not_found() {
        let c = Components::discover(&hierarchy());
        let last = c.ids().last().unwrap();
        let small = Components::new();
        assert!(small.read(last).is_none());
        assert!(small.update(last, |_| ()).is_none());
        assert!(small.hosts_of(last).is_empty());
    }
}
