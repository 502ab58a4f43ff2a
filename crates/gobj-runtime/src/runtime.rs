//! GObj Runtime - instance table, creation and lifecycle
//!
//! The runtime is an explicit context object: it owns the class registry,
//! the instance arena, the service registry and every subscription. Several
//! runtimes may coexist in one process.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use gobj_core::{
    AttrFlags, AttrValue, ClassFlags, GObjError, GObjFlags, GObjId, GObjResult, Kw, SubscriptionId,
};
use gobj_state::{AttrPersistence, AttrStore};

use crate::instance::Arena;
use crate::{ClassRegistry, GClass, GObj, RuntimeConfig, Subscription};

/// Runtime counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub instances_created: u64,
    pub instances_destroyed: u64,
    pub events_sent: u64,
    pub events_not_handled: u64,
    pub unknown_events: u64,
    pub publications: u64,
    pub deliveries: u64,
    pub publications_without_subscribers: u64,
    /// Sends and publications dropped because an instance was gone
    pub dropped_dispatches: u64,
}

/// The object runtime
pub struct Runtime {
    pub(crate) config: RuntimeConfig,
    pub(crate) registry: ClassRegistry,
    pub(crate) arena: Arena,
    /// Instances without parent, in creation order
    pub(crate) roots: Vec<GObjId>,
    pub(crate) services: HashMap<String, GObjId>,
    pub(crate) yuno: Option<GObjId>,
    pub(crate) default_service: Option<GObjId>,
    pub(crate) subscriptions: HashMap<SubscriptionId, Subscription>,
    pub(crate) next_subscription: u64,
    persistence: Option<Arc<dyn AttrPersistence>>,
    global_settings: Kw,
    /// Current nesting of `send_event`
    pub(crate) depth: usize,
    pub(crate) stats: RuntimeStats,
}

impl Runtime {
    /// Create a runtime with default configuration
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Runtime {
            config,
            registry: ClassRegistry::new(),
            arena: Arena::default(),
            roots: Vec::new(),
            services: HashMap::new(),
            yuno: None,
            default_service: None,
            subscriptions: HashMap::new(),
            next_subscription: 1,
            persistence: None,
            global_settings: Kw::new(),
            depth: 0,
            stats: RuntimeStats::default(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut RuntimeConfig {
        &mut self.config
    }

    pub fn stats(&self) -> &RuntimeStats {
        &self.stats
    }

    /// Settings shared by every class, e.g. deployment-wide defaults
    pub fn global_settings(&self) -> &Kw {
        &self.global_settings
    }

    pub fn set_global_settings(&mut self, settings: Kw) {
        self.global_settings = settings;
    }

    /// Inject the storage collaborator for persistent attributes
    pub fn set_persistence(&mut self, persistence: Arc<dyn AttrPersistence>) {
        self.persistence = Some(persistence);
    }

    // ---------------------------------------------------------------
    // Classes
    // ---------------------------------------------------------------

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub fn register_class(&mut self, gclass: GClass) -> GObjResult<Rc<GClass>> {
        self.registry.register(gclass)
    }

    pub fn unregister_class(&mut self, name: &str) -> GObjResult<()> {
        self.registry.unregister(name)
    }

    pub fn gclass(&self, name: &str) -> GObjResult<Rc<GClass>> {
        self.registry.lookup(name)
    }

    // ---------------------------------------------------------------
    // Instance access
    // ---------------------------------------------------------------

    pub fn gobj(&self, id: GObjId) -> GObjResult<&GObj> {
        self.arena.get(id).ok_or(GObjError::DestroyedTarget(id))
    }

    pub(crate) fn gobj_mut(&mut self, id: GObjId) -> GObjResult<&mut GObj> {
        self.arena.get_mut(id).ok_or(GObjError::DestroyedTarget(id))
    }

    /// Instance that exists and is not being destroyed
    pub(crate) fn live(&self, id: GObjId) -> GObjResult<&GObj> {
        match self.arena.get(id) {
            Some(gobj) if !gobj.destroying => Ok(gobj),
            _ => Err(GObjError::DestroyedTarget(id)),
        }
    }

    pub fn is_alive(&self, id: GObjId) -> bool {
        self.live(id).is_ok()
    }

    pub(crate) fn gclass_of(&self, id: GObjId) -> GObjResult<Rc<GClass>> {
        Ok(Rc::clone(&self.gobj(id)?.gclass))
    }

    /// Number of live instances
    pub fn instance_count(&self) -> usize {
        self.arena.len()
    }

    pub fn instances_of(&self, gclass: &str) -> Vec<GObjId> {
        self.arena
            .iter()
            .filter(|g| g.gclass.name() == gclass)
            .map(|g| g.id)
            .collect()
    }

    /// Instances without parent
    pub fn roots(&self) -> &[GObjId] {
        &self.roots
    }

    pub fn private<T: Any>(&self, id: GObjId) -> Option<&T> {
        self.arena.get(id)?.private.as_ref()?.downcast_ref()
    }

    pub fn private_mut<T: Any>(&mut self, id: GObjId) -> Option<&mut T> {
        self.arena.get_mut(id)?.private.as_mut()?.downcast_mut()
    }

    pub fn name(&self, id: GObjId) -> GObjResult<&str> {
        Ok(self.gobj(id)?.name())
    }

    /// `gclass^name`
    pub fn short_name(&self, id: GObjId) -> String {
        match self.arena.get(id) {
            Some(gobj) => gobj.short_name(),
            None => format!("<destroyed {id}>"),
        }
    }

    /// Ancestor short names joined by a backtick, root first
    pub fn full_name(&self, id: GObjId) -> String {
        let mut parts = Vec::new();
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            match self.arena.get(cur) {
                Some(gobj) => {
                    parts.push(gobj.short_name());
                    cursor = gobj.parent;
                }
                None => {
                    parts.push(format!("<destroyed {cur}>"));
                    break;
                }
            }
        }
        parts.reverse();
        parts.join("`")
    }

    // ---------------------------------------------------------------
    // Services
    // ---------------------------------------------------------------

    pub fn find_service(&self, name: &str) -> Option<GObjId> {
        self.services.get(&name.to_lowercase()).copied()
    }

    pub fn yuno(&self) -> Option<GObjId> {
        self.yuno
    }

    pub fn default_service(&self) -> Option<GObjId> {
        self.default_service
    }

    /// Registered service names, sorted
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    // ---------------------------------------------------------------
    // Creation
    // ---------------------------------------------------------------

    /// Create an instance, merging `config` over the class defaults
    pub fn create(&mut self, name: &str, gclass: &str, config: Kw, parent: Option<GObjId>) -> GObjResult<GObjId> {
        self.create_obj(name, gclass, config, parent, GObjFlags::NONE)
    }

    /// Create the root instance of the process
    pub fn create_yuno(&mut self, name: &str, gclass: &str, config: Kw) -> GObjResult<GObjId> {
        self.create_obj(name, gclass, config, None, GObjFlags::YUNO)
    }

    /// Create an instance registered under a process-wide unique name
    pub fn create_service(
        &mut self,
        name: &str,
        gclass: &str,
        config: Kw,
        parent: Option<GObjId>,
    ) -> GObjResult<GObjId> {
        self.create_obj(name, gclass, config, parent, GObjFlags::SERVICE)
    }

    pub fn create_default_service(
        &mut self,
        name: &str,
        gclass: &str,
        config: Kw,
        parent: Option<GObjId>,
    ) -> GObjResult<GObjId> {
        self.create_obj(name, gclass, config, parent, GObjFlags::DEFAULT_SERVICE)
    }

    pub fn create_volatil(&mut self, name: &str, gclass: &str, config: Kw, parent: Option<GObjId>) -> GObjResult<GObjId> {
        self.create_obj(name, gclass, config, parent, GObjFlags::VOLATIL)
    }

    /// Create a child that sends its output events to `parent`
    pub fn create_pure_child(&mut self, name: &str, gclass: &str, config: Kw, parent: GObjId) -> GObjResult<GObjId> {
        self.create_obj(name, gclass, config, Some(parent), GObjFlags::PURE_CHILD)
    }

    /// Create an instance with explicit flags
    pub fn create_obj(
        &mut self,
        name: &str,
        gclass_name: &str,
        config: Kw,
        parent: Option<GObjId>,
        flags: GObjFlags,
    ) -> GObjResult<GObjId> {
        let gclass = self.registry.lookup(gclass_name).map_err(|e| {
            error!(gclass = %gclass_name, gobj = %name, "GClass not registered");
            e
        })?;
        let name = check_gobj_name(name)?;

        if gclass.flags().contains(ClassFlags::SINGLETON) && gclass.instances() > 0 {
            error!(gclass = %gclass_name, "GClass singleton already instantiated");
            return Err(GObjError::SingletonViolation(gclass_name.to_string()));
        }
        if flags.is_service() {
            if name.is_empty() {
                return Err(GObjError::InvalidName(String::new()));
            }
            if self.services.contains_key(&name) {
                error!(gclass = %gclass_name, service = %name, "Service ALREADY registered");
                return Err(GObjError::DuplicateService(name));
            }
        }
        if flags.contains(GObjFlags::YUNO) && self.yuno.is_some() {
            return Err(GObjError::DuplicateService(name));
        }
        if flags.contains(GObjFlags::DEFAULT_SERVICE) && self.default_service.is_some() {
            return Err(GObjError::DuplicateService(name));
        }
        if flags.is_pure_child() && parent.is_none() {
            return Err(GObjError::InvalidTree(format!("pure child {name} without parent")));
        }
        if let Some(parent) = parent {
            self.live(parent)?;
        }
        self.check_unique_name(parent, &name, None)?;

        let mut attrs = AttrStore::define(Arc::clone(gclass.schema()));
        let ignore_unknown = gclass.flags().contains(ClassFlags::IGNORE_UNKNOWN_ATTRS);
        if let Err(e) = attrs.merge_json(&config, ignore_unknown) {
            warn!(gclass = %gclass_name, gobj = %name, error = %e, "Invalid creation config");
            return Err(e);
        }

        let id = self.arena.next_id();
        self.arena.insert(GObj::new(id, name.clone(), Rc::clone(&gclass), flags, attrs));
        gclass.inc_instances();
        self.stats.instances_created += 1;

        match parent {
            Some(parent) => {
                self.gobj_mut(parent)?.children.push(id);
                self.gobj_mut(id)?.parent = Some(parent);
            }
            None => self.roots.push(id),
        }
        if flags.is_service() {
            self.services.insert(name.clone(), id);
        }
        if flags.contains(GObjFlags::YUNO) {
            self.yuno = Some(id);
        }
        if flags.contains(GObjFlags::DEFAULT_SERVICE) {
            self.default_service = Some(id);
        }
        if flags.is_service() && self.persistence.is_some() {
            if let Err(e) = self.load_persistent_attrs(id) {
                warn!(gobj = %self.full_name(id), error = %e, "Cannot load persistent attributes");
            }
        }

        if self.config.trace_creation {
            debug!(gobj = %self.full_name(id), "created");
        }

        if let Some(hook) = &gclass.hooks.create {
            hook(self, id);
        }
        if let Some(parent) = parent {
            self.notify_child_added(parent, id);
        }
        Ok(id)
    }

    /// Sibling names (or root names) must be unique; empty names are anonymous
    pub(crate) fn check_unique_name(&self, scope: Option<GObjId>, name: &str, except: Option<GObjId>) -> GObjResult<()> {
        if name.is_empty() {
            return Ok(());
        }
        let siblings: &[GObjId] = match scope {
            Some(parent) => &self.gobj(parent)?.children,
            None => &self.roots,
        };
        let clash = siblings
            .iter()
            .filter(|&&sibling| Some(sibling) != except)
            .filter_map(|&sibling| self.arena.get(sibling))
            .any(|sibling| !sibling.destroying && sibling.name == name);
        if clash {
            return Err(GObjError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Start an instance. Starting a running instance is a no-op.
    pub fn start(&mut self, id: GObjId) -> GObjResult<i32> {
        let gobj = self.live(id)?;
        if gobj.running {
            debug!(gobj = %self.full_name(id), "GObj ALREADY RUNNING");
            return Ok(0);
        }
        if gobj.disabled {
            warn!(gobj = %self.full_name(id), "GObj DISABLED");
            return Err(GObjError::Disabled(id));
        }
        let missing = gobj.attrs.missing_required();
        if !missing.is_empty() {
            warn!(gobj = %self.full_name(id), attrs = ?missing, "Cannot start without all required attributes");
            return Err(GObjError::RequiredMissing(missing.join(",")));
        }
        if self.config.trace_creation {
            debug!(gobj = %self.full_name(id), "start");
        }
        let gclass = Rc::clone(&gobj.gclass);
        self.gobj_mut(id)?.running = true;
        Ok(gclass.hooks.start.as_ref().map_or(0, |hook| hook(self, id)))
    }

    /// Stop an instance. Stopping a stopped instance is a silent no-op.
    pub fn stop(&mut self, id: GObjId) -> GObjResult<i32> {
        let gobj = self.live(id)?;
        if !gobj.running {
            return Ok(0);
        }
        self.do_stop(id)
    }

    pub(crate) fn do_stop(&mut self, id: GObjId) -> GObjResult<i32> {
        if self.gobj(id)?.playing {
            info!(gobj = %self.full_name(id), "GObj stopping without previous pause");
            self.do_pause(id)?;
        }
        if self.config.trace_creation {
            debug!(gobj = %self.full_name(id), "stop");
        }
        let gclass = self.gclass_of(id)?;
        self.gobj_mut(id)?.running = false;
        let ret = gclass.hooks.stop.as_ref().map_or(0, |hook| hook(self, id));
        if self.config.unsubscribe_on_stop && self.arena.get(id).is_some() {
            let subscribings = self.gobj(id)?.subscribings.clone();
            self.unsubscribe_list(&subscribings, false);
        }
        Ok(ret)
    }

    /// Play an instance, starting it first unless its class requires an
    /// explicit start
    pub fn play(&mut self, id: GObjId) -> GObjResult<i32> {
        let gobj = self.live(id)?;
        if gobj.playing {
            debug!(gobj = %self.full_name(id), "GObj ALREADY PLAYING");
            return Ok(0);
        }
        if gobj.disabled {
            warn!(gobj = %self.full_name(id), "GObj DISABLED");
            return Err(GObjError::Disabled(id));
        }
        if !gobj.running {
            if gobj.gclass.flags().contains(ClassFlags::REQUIRED_START_TO_PLAY) {
                warn!(gobj = %self.full_name(id), "Cannot play, start not done");
                return Err(GObjError::NotRunning(id));
            }
            info!(gobj = %self.full_name(id), "GObj playing without previous start");
            self.start(id)?;
        }
        let gclass = self.gclass_of(id)?;
        self.gobj_mut(id)?.playing = true;
        let ret = gclass.hooks.play.as_ref().map_or(0, |hook| hook(self, id));
        if ret < 0 {
            if let Some(gobj) = self.arena.get_mut(id) {
                gobj.playing = false;
            }
        }
        Ok(ret)
    }

    /// Pause an instance. Pausing a paused instance is a no-op.
    pub fn pause(&mut self, id: GObjId) -> GObjResult<i32> {
        if !self.live(id)?.playing {
            return Ok(0);
        }
        self.do_pause(id)
    }

    pub(crate) fn do_pause(&mut self, id: GObjId) -> GObjResult<i32> {
        let gclass = self.gclass_of(id)?;
        self.gobj_mut(id)?.playing = false;
        Ok(gclass.hooks.pause.as_ref().map_or(0, |hook| hook(self, id)))
    }

    /// Re-enable a disabled instance and start its tree
    pub fn enable(&mut self, id: GObjId) -> GObjResult<()> {
        let gobj = self.live(id)?;
        if !gobj.disabled {
            return Ok(());
        }
        self.gobj_mut(id)?.disabled = false;
        if !self.gobj(id)?.running {
            self.start_tree(id)?;
        }
        Ok(())
    }

    /// Disable an instance, stopping its tree. Disabled instances cannot start.
    pub fn disable(&mut self, id: GObjId) -> GObjResult<()> {
        let gobj = self.live(id)?;
        if gobj.disabled {
            return Ok(());
        }
        let running = gobj.running;
        self.gobj_mut(id)?.disabled = true;
        if running {
            self.stop_tree(id)?;
        }
        Ok(())
    }

    /// Destroy an instance and its descendants.
    ///
    /// The parent is told through `child_removed` while the instance is still
    /// operative. Running instances are paused and stopped, every
    /// subscription on or by the instance is purged, children are destroyed,
    /// and the destroy hook runs last.
    pub fn destroy(&mut self, id: GObjId) -> GObjResult<()> {
        let gobj = self.gobj(id)?;
        if gobj.destroying {
            warn!(gobj = %self.full_name(id), "GObj DESTROYING");
            return Err(GObjError::DestroyedTarget(id));
        }
        let gclass = Rc::clone(&gobj.gclass);
        let parent = gobj.parent;
        if self.config.trace_creation {
            debug!(gobj = %self.full_name(id), "destroying");
        }
        self.gobj_mut(id)?.destroying = true;

        if let Some(parent) = parent {
            self.notify_child_removed(parent, id);
        }
        self.deregister_service(id);

        if self.gobj(id)?.playing {
            warn!(gobj = %self.full_name(id), "Destroying a PLAYING gobj");
            self.do_pause(id)?;
        }
        if self.gobj(id)?.running {
            warn!(gobj = %self.full_name(id), "Destroying a RUNNING gobj");
            self.do_stop(id)?;
        }

        self.purge_subscriptions(id);
        self.unlink(id)?;
        self.destroy_children(id)?;

        if let Some(hook) = &gclass.hooks.destroy {
            hook(self, id);
        }
        // The destroy hook may still have touched the router
        self.purge_subscriptions(id);

        if let Some(gobj) = self.arena.remove(id) {
            if self.config.trace_creation {
                debug!(gobj = %gobj.short_name(), "destroyed");
            }
        }
        gclass.dec_instances();
        self.stats.instances_destroyed += 1;
        Ok(())
    }

    fn deregister_service(&mut self, id: GObjId) {
        let Some(gobj) = self.arena.get(id) else {
            return;
        };
        if gobj.flags.is_service() && self.services.get(&gobj.name) == Some(&id) {
            let name = gobj.name.clone();
            self.services.remove(&name);
        }
        if self.yuno == Some(id) {
            self.yuno = None;
        }
        if self.default_service == Some(id) {
            self.default_service = None;
        }
    }

    /// Detach from the parent's child list (or the root list)
    pub(crate) fn unlink(&mut self, id: GObjId) -> GObjResult<()> {
        let parent = self.gobj_mut(id)?.parent.take();
        match parent {
            Some(parent) => {
                if let Some(parent) = self.arena.get_mut(parent) {
                    parent.children.retain(|&c| c != id);
                }
            }
            None => self.roots.retain(|&r| r != id),
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------

    pub fn has_attr(&self, id: GObjId, name: &str) -> bool {
        self.arena.get(id).map_or(false, |g| g.attrs.has(name))
    }

    pub fn read_attr(&self, id: GObjId, name: &str) -> GObjResult<&AttrValue> {
        let gobj = self.gobj(id)?;
        gobj.attrs.read(name).map_err(|e| {
            warn!(gobj = %gobj.short_name(), attr = %name, error = %e, "Cannot read attribute");
            e
        })
    }

    pub fn read_str(&self, id: GObjId, name: &str) -> Option<&str> {
        self.read_attr(id, name).ok()?.as_str()
    }

    pub fn read_i64(&self, id: GObjId, name: &str) -> Option<i64> {
        self.read_attr(id, name).ok()?.as_i64()
    }

    pub fn read_bool(&self, id: GObjId, name: &str) -> Option<bool> {
        self.read_attr(id, name).ok()?.as_bool()
    }

    pub fn read_pointer(&self, id: GObjId, name: &str) -> Option<GObjId> {
        self.read_attr(id, name).ok()?.as_pointer()
    }

    /// Write an attribute of exactly the declared type, then call the
    /// class writing hook with the attribute name
    pub fn write_attr(&mut self, id: GObjId, name: &str, value: impl Into<AttrValue>) -> GObjResult<()> {
        let gobj = self.gobj_mut(id)?;
        if let Err(e) = gobj.attrs.write(name, value.into()) {
            warn!(gobj = %gobj.short_name(), attr = %name, error = %e, "Cannot write attribute");
            return Err(e);
        }
        self.notify_writing(id, name);
        Ok(())
    }

    /// Write an attribute from a JSON value, coercing it to the declared type
    pub fn write_attr_json(&mut self, id: GObjId, name: &str, value: &Value) -> GObjResult<()> {
        let gobj = self.gobj_mut(id)?;
        if let Err(e) = gobj.attrs.write_json(name, value) {
            warn!(gobj = %gobj.short_name(), attr = %name, error = %e, "Cannot write attribute");
            return Err(e);
        }
        self.notify_writing(id, name);
        Ok(())
    }

    /// Merge several attributes from a config map, then call the writing
    /// hook once per attribute written
    pub fn write_attrs(&mut self, id: GObjId, kw: &Kw) -> GObjResult<()> {
        let gobj = self.gobj_mut(id)?;
        let ignore_unknown = gobj.gclass.flags().contains(ClassFlags::IGNORE_UNKNOWN_ATTRS);
        let written = gobj.attrs.merge_json(kw, ignore_unknown)?;
        for name in written {
            self.notify_writing(id, name);
        }
        Ok(())
    }

    fn notify_writing(&mut self, id: GObjId, name: &str) {
        let Ok(gclass) = self.gclass_of(id) else {
            return;
        };
        if let Some(hook) = &gclass.hooks.writing {
            hook(self, id, name);
        }
    }

    /// JSON view of the attributes carrying any of `flags` (`NONE` = all)
    pub fn attrs_json(&self, id: GObjId, flags: AttrFlags) -> GObjResult<Kw> {
        Ok(self.gobj(id)?.attrs.to_json(flags))
    }

    pub fn reset_stats(&mut self, id: GObjId) -> GObjResult<()> {
        self.gobj_mut(id)?.attrs.reset_stats();
        Ok(())
    }

    // ---------------------------------------------------------------
    // Persistence pass-through
    // ---------------------------------------------------------------

    fn persistence(&self) -> GObjResult<Arc<dyn AttrPersistence>> {
        self.persistence
            .clone()
            .ok_or_else(|| GObjError::Persistence("no persistence collaborator".into()))
    }

    /// Save the `PERSIST` attributes of an instance under its full name
    pub fn save_persistent_attrs(&self, id: GObjId) -> GObjResult<()> {
        let store = self.persistence()?;
        let attrs = self.gobj(id)?.attrs.save(true);
        store.save(&self.full_name(id), &attrs)
    }

    /// Restore the `PERSIST` attributes of an instance, if saved
    pub fn load_persistent_attrs(&mut self, id: GObjId) -> GObjResult<bool> {
        let store = self.persistence()?;
        let key = self.full_name(id);
        let Some(saved) = store.load(&key)? else {
            return Ok(false);
        };
        self.gobj_mut(id)?.attrs.load(&saved)?;
        Ok(true)
    }

    pub fn remove_persistent_attrs(&self, id: GObjId) -> GObjResult<bool> {
        let store = self.persistence()?;
        store.remove(&self.full_name(id))
    }

    pub fn list_persistent_attrs(&self) -> GObjResult<Vec<String>> {
        self.persistence()?.keys()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Instance names are lower-cased and may not contain the full-name
/// separators
pub fn check_gobj_name(name: &str) -> GObjResult<String> {
    if name.contains(['`', '^']) {
        return Err(GObjError::InvalidName(name.to_string()));
    }
    Ok(name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use gobj_core::{kw_from, AttrDesc, DataType, EventFlags};
    use crate::GClassBuilder;
    use gobj_state::MemoryStore;
    use serde_json::json;

    type Log = Rc<RefCell<Vec<String>>>;

    fn node_class(name: &str, log: &Log) -> GClassBuilder {
        let (l1, l2, l3, l4, l5, l6) = (log.clone(), log.clone(), log.clone(), log.clone(), log.clone(), log.clone());
        GClass::builder(name)
            .attr(AttrDesc::new(DataType::String, "url", AttrFlags::WR, "Url"))
            .attr(AttrDesc::new(DataType::Integer, "timeout", AttrFlags::PERSIST, "Timeout").with_default(10))
            .event("EV_CHANGED", EventFlags::OUTPUT)
            .state("ST_IDLE", [])
            .on_create(move |rt, id| l1.borrow_mut().push(format!("create {}", rt.short_name(id))))
            .on_start(move |rt, id| {
                l2.borrow_mut().push(format!("start {}", rt.name(id).unwrap_or("")));
                0
            })
            .on_stop(move |rt, id| {
                l3.borrow_mut().push(format!("stop {}", rt.name(id).unwrap_or("")));
                0
            })
            .on_play(move |_, _| {
                l4.borrow_mut().push("play".into());
                0
            })
            .on_destroy(move |rt, id| l5.borrow_mut().push(format!("destroy {}", rt.name(id).unwrap_or(""))))
            .on_writing(move |_, _, path| l6.borrow_mut().push(format!("writing {path}")))
    }

    fn setup() -> (Runtime, Log) {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();
        rt.register_class(node_class("C_NODE", &log).build().unwrap()).unwrap();
        (rt, log)
    }

    #[test]
    fn test_create_merges_config() {
        let (mut rt, log) = setup();
        let id = rt.create("Node1", "C_NODE", kw_from(json!({"timeout": "25"})), None).unwrap();
        assert_eq!(rt.name(id).unwrap(), "node1");
        assert_eq!(rt.read_i64(id, "timeout"), Some(25));
        assert_eq!(rt.read_str(id, "url"), Some(""));
        assert_eq!(log.borrow().as_slice(), ["create C_NODE^node1"]);
        assert_eq!(rt.gclass("C_NODE").unwrap().instances(), 1);
        assert_eq!(rt.stats().instances_created, 1);
    }

    #[test]
    fn test_create_failures() {
        let (mut rt, _) = setup();
        assert_eq!(
            rt.create("x", "C_NOPE", Kw::new(), None),
            Err(GObjError::UnknownClass("C_NOPE".into()))
        );
        assert!(matches!(
            rt.create("x", "C_NODE", kw_from(json!({"timeout": "soon"})), None),
            Err(GObjError::TypeMismatch { .. })
        ));
        assert_eq!(
            rt.create("x", "C_NODE", kw_from(json!({"colour": 1})), None),
            Err(GObjError::UnknownAttribute("colour".into()))
        );
        assert!(matches!(rt.create("a^b", "C_NODE", Kw::new(), None), Err(GObjError::InvalidName(_))));
        assert_eq!(rt.instance_count(), 0);
    }

    #[test]
    fn test_sibling_names_unique() {
        let (mut rt, _) = setup();
        let parent = rt.create("p", "C_NODE", Kw::new(), None).unwrap();
        rt.create("c", "C_NODE", Kw::new(), Some(parent)).unwrap();
        assert_eq!(
            rt.create("C", "C_NODE", Kw::new(), Some(parent)),
            Err(GObjError::DuplicateName("c".into()))
        );
        rt.create("", "C_NODE", Kw::new(), Some(parent)).unwrap();
        rt.create("", "C_NODE", Kw::new(), Some(parent)).unwrap();
        rt.create("c", "C_NODE", Kw::new(), None).unwrap();
        assert_eq!(rt.gobj(parent).unwrap().children().len(), 3);
    }

    #[test]
    fn test_services() {
        let (mut rt, _) = setup();
        let yuno = rt.create_yuno("app", "C_NODE", Kw::new()).unwrap();
        let svc = rt.create_service("Store", "C_NODE", Kw::new(), Some(yuno)).unwrap();
        assert_eq!(rt.find_service("store"), Some(svc));
        assert_eq!(rt.find_service("STORE"), Some(svc));
        assert_eq!(rt.yuno(), Some(yuno));
        assert_eq!(
            rt.create_service("store", "C_NODE", Kw::new(), None),
            Err(GObjError::DuplicateService("store".into()))
        );
        assert!(matches!(rt.create_service("", "C_NODE", Kw::new(), None), Err(GObjError::InvalidName(_))));
        assert_eq!(rt.full_name(svc), "C_NODE^app`C_NODE^store");
        rt.destroy(svc).unwrap();
        assert_eq!(rt.find_service("store"), None);
        assert_eq!(rt.service_names(), vec!["app"]);
    }

    #[test]
    fn test_singleton() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();
        rt.register_class(node_class("C_ONE", &log).flags(ClassFlags::SINGLETON).build().unwrap())
            .unwrap();
        let id = rt.create("a", "C_ONE", Kw::new(), None).unwrap();
        assert_eq!(
            rt.create("b", "C_ONE", Kw::new(), None),
            Err(GObjError::SingletonViolation("C_ONE".into()))
        );
        rt.destroy(id).unwrap();
        rt.create("b", "C_ONE", Kw::new(), None).unwrap();
    }

    #[test]
    fn test_start_stop_idempotent() {
        let (mut rt, log) = setup();
        let id = rt.create("n", "C_NODE", Kw::new(), None).unwrap();
        assert_eq!(rt.start(id), Ok(0));
        assert_eq!(rt.start(id), Ok(0));
        assert_eq!(rt.stop(id), Ok(0));
        assert_eq!(rt.stop(id), Ok(0));
        let entries: Vec<_> = log.borrow().iter().filter(|e| !e.starts_with("create")).cloned().collect();
        assert_eq!(entries, vec!["start n", "stop n"]);
    }

    #[test]
    fn test_start_requires_attrs() {
        let mut rt = Runtime::new();
        rt.register_class(
            GClass::builder("C_REQ")
                .attr(AttrDesc::new(DataType::String, "url", AttrFlags::REQUIRED, "Url"))
                .state("ST_IDLE", [])
                .build()
                .unwrap(),
        )
        .unwrap();
        let id = rt.create("r", "C_REQ", Kw::new(), None).unwrap();
        assert_eq!(rt.start(id), Err(GObjError::RequiredMissing("url".into())));
        assert_eq!(rt.read_attr(id, "url"), Err(GObjError::RequiredMissing("url".into())));
        rt.write_attr(id, "url", "ws://h").unwrap();
        assert_eq!(rt.start(id), Ok(0));
    }

    #[test]
    fn test_play_autostarts() {
        let (mut rt, log) = setup();
        let id = rt.create("n", "C_NODE", Kw::new(), None).unwrap();
        assert_eq!(rt.play(id), Ok(0));
        assert!(rt.gobj(id).unwrap().is_running());
        assert!(rt.gobj(id).unwrap().is_playing());
        rt.stop(id).unwrap();
        assert!(!rt.gobj(id).unwrap().is_playing());
        assert!(log.borrow().contains(&"play".to_string()));
    }

    #[test]
    fn test_play_requires_start() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let mut rt = Runtime::new();
        rt.register_class(
            node_class("C_STRICT", &log)
                .flags(ClassFlags::REQUIRED_START_TO_PLAY)
                .build()
                .unwrap(),
        )
        .unwrap();
        let id = rt.create("s", "C_STRICT", Kw::new(), None).unwrap();
        assert_eq!(rt.play(id), Err(GObjError::NotRunning(id)));
        rt.start(id).unwrap();
        assert_eq!(rt.play(id), Ok(0));
    }

    #[test]
    fn test_disable_blocks_start() {
        let (mut rt, _) = setup();
        let id = rt.create("n", "C_NODE", Kw::new(), None).unwrap();
        rt.start(id).unwrap();
        rt.disable(id).unwrap();
        assert!(!rt.gobj(id).unwrap().is_running());
        assert_eq!(rt.start(id), Err(GObjError::Disabled(id)));
        rt.enable(id).unwrap();
        assert!(rt.gobj(id).unwrap().is_running());
    }

    #[test]
    fn test_write_attr_calls_writing_hook() {
        let (mut rt, log) = setup();
        let id = rt.create("n", "C_NODE", Kw::new(), None).unwrap();
        rt.write_attr(id, "url", "ws://x").unwrap();
        assert!(matches!(rt.write_attr(id, "url", 3), Err(GObjError::TypeMismatch { .. })));
        rt.write_attr_json(id, "timeout", &json!(7)).unwrap();
        let writes: Vec<_> = log.borrow().iter().filter(|e| e.starts_with("writing")).cloned().collect();
        assert_eq!(writes, vec!["writing url", "writing timeout"]);
        assert_eq!(rt.read_attr(id, "url"), Ok(&AttrValue::from("ws://x")));
    }

    #[test]
    fn test_destroyed_instance_is_gone() {
        let (mut rt, log) = setup();
        let id = rt.create("n", "C_NODE", Kw::new(), None).unwrap();
        rt.start(id).unwrap();
        rt.destroy(id).unwrap();
        assert!(!rt.is_alive(id));
        assert_eq!(rt.destroy(id), Err(GObjError::DestroyedTarget(id)));
        assert_eq!(rt.read_attr(id, "url"), Err(GObjError::DestroyedTarget(id)));
        assert!(log.borrow().contains(&"stop n".to_string()));
        assert_eq!(log.borrow().last().map(String::as_str), Some("destroy n"));
        assert_eq!(rt.gclass("C_NODE").unwrap().instances(), 0);
        assert!(rt.roots().is_empty());
    }

    #[test]
    fn test_persistence_passthrough() {
        let (mut rt, _) = setup();
        assert!(matches!(rt.list_persistent_attrs(), Err(GObjError::Persistence(_))));
        let store = Arc::new(MemoryStore::new());
        rt.set_persistence(store.clone());

        let svc = rt.create_service("cfg", "C_NODE", kw_from(json!({"timeout": 99})), None).unwrap();
        rt.save_persistent_attrs(svc).unwrap();
        assert_eq!(rt.list_persistent_attrs().unwrap(), vec!["C_NODE^cfg".to_string()]);
        rt.destroy(svc).unwrap();

        let again = rt.create_service("cfg", "C_NODE", Kw::new(), None).unwrap();
        assert_eq!(rt.read_i64(again, "timeout"), Some(99));
        assert!(rt.remove_persistent_attrs(again).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_private_data() {
        let mut rt = Runtime::new();
        rt.register_class(
            GClass::builder("C_PRIV")
                .state("ST_IDLE", [])
                .private_data(Vec::<u32>::new)
                .build()
                .unwrap(),
        )
        .unwrap();
        let id = rt.create("p", "C_PRIV", Kw::new(), None).unwrap();
        rt.private_mut::<Vec<u32>>(id).unwrap().push(4);
        assert_eq!(rt.private::<Vec<u32>>(id), Some(&vec![4]));
        assert!(rt.private::<String>(id).is_none());
    }
}
