//! Class registry

use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, error};

use gobj_core::{GObjError, GObjResult};

use crate::GClass;

/// Table of registered classes, owned by a [`Runtime`](crate::Runtime)
#[derive(Debug, Default)]
pub struct ClassRegistry {
    classes: HashMap<String, Rc<GClass>>,
    /// Registration order
    order: Vec<String>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        ClassRegistry::default()
    }

    /// Register a class. The first registration of a name wins.
    pub fn register(&mut self, gclass: GClass) -> GObjResult<Rc<GClass>> {
        let name = gclass.name().to_string();
        if self.classes.contains_key(&name) {
            error!(gclass = %name, "GClass ALREADY registered");
            return Err(GObjError::DuplicateClass(name));
        }
        debug!(gclass = %name, "GClass registered");
        let gclass = Rc::new(gclass);
        self.classes.insert(name.clone(), Rc::clone(&gclass));
        self.order.push(name);
        Ok(gclass)
    }

    pub fn lookup(&self, name: &str) -> GObjResult<Rc<GClass>> {
        self.classes
            .get(name)
            .cloned()
            .ok_or_else(|| GObjError::UnknownClass(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Remove a class without live instances
    pub fn unregister(&mut self, name: &str) -> GObjResult<()> {
        let gclass = self.lookup(name)?;
        if gclass.instances() > 0 {
            return Err(GObjError::ClassInUse {
                gclass: name.to_string(),
                instances: gclass.instances(),
            });
        }
        self.classes.remove(name);
        self.order.retain(|n| n != name);
        debug!(gclass = %name, "GClass unregistered");
        Ok(())
    }

    /// Class names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}
