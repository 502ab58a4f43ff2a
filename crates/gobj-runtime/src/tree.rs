//! Instance trees from JSON
//!
//! ```json
//! {
//!     "gclass": "C_PANEL",
//!     "name": "panel",
//!     "as_service": true,
//!     "autostart": true,
//!     "kw": {"title": "Alarms"},
//!     "zchilds": [
//!         {"gclass": "C_TIMER", "name": "refresh", "kw": {"msec": 1000}}
//!     ]
//! }
//! ```

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use gobj_core::{AttrValue, DataType, GObjError, GObjFlags, GObjId, GObjResult, Kw};

use crate::Runtime;

/// One node of a tree config
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct TreeNode {
    pub gclass: String,
    pub name: String,
    pub kw: Kw,
    #[serde(alias = "service")]
    pub as_service: bool,
    pub default_service: bool,
    pub pure_child: bool,
    pub autostart: bool,
    pub autoplay: bool,
    pub disabled: bool,
    pub zchilds: Vec<TreeNode>,
}

impl TreeNode {
    pub fn from_json(value: &Value) -> GObjResult<Self> {
        let node = TreeNode::deserialize(value).map_err(|e| GObjError::InvalidTree(e.to_string()))?;
        node.validate()?;
        Ok(node)
    }

    fn validate(&self) -> GObjResult<()> {
        if self.gclass.is_empty() {
            return Err(GObjError::InvalidTree(format!("node {:?} without gclass", self.name)));
        }
        self.zchilds.iter().try_for_each(TreeNode::validate)
    }

    fn flags(&self) -> GObjFlags {
        let mut flags = GObjFlags::NONE;
        if self.as_service {
            flags.insert(GObjFlags::SERVICE);
        }
        if self.default_service {
            flags.insert(GObjFlags::SERVICE | GObjFlags::DEFAULT_SERVICE);
        }
        if self.pure_child {
            flags.insert(GObjFlags::PURE_CHILD);
        }
        if self.autostart {
            flags.insert(GObjFlags::AUTOSTART);
        }
        if self.autoplay {
            flags.insert(GObjFlags::AUTOPLAY);
        }
        flags
    }
}

impl Runtime {
    /// Build an instance tree under `parent` from its JSON description.
    ///
    /// Nodes are created parents first. A pointer attribute named
    /// `subscriber` left unset defaults to the node's parent. Once the whole
    /// tree exists, `autostart` nodes are started and `autoplay` nodes
    /// played. On a creation error the part already built is destroyed.
    pub fn create_tree(&mut self, parent: Option<GObjId>, config: &Value) -> GObjResult<GObjId> {
        let node = TreeNode::from_json(config)?;
        let mut created = Vec::new();
        let root = match self.create_node(parent, &node, &mut created) {
            Ok(root) => root,
            Err(e) => {
                warn!(error = %e, gclass = %node.gclass, name = %node.name, "create_tree failed");
                if let Some(&first) = created.first() {
                    if let Err(rollback) = self.destroy(first) {
                        warn!(gobj = %first, error = %rollback, "create_tree: rollback failed");
                    }
                }
                return Err(e);
            }
        };

        for &id in &created {
            let Ok(gobj) = self.live(id) else {
                continue;
            };
            let flags = gobj.flags;
            if flags.contains(GObjFlags::AUTOSTART) {
                if let Err(e) = self.start_tree(id) {
                    warn!(gobj = %self.full_name(id), error = %e, "autostart failed");
                }
            }
            if flags.contains(GObjFlags::AUTOPLAY) {
                if let Err(e) = self.play(id) {
                    warn!(gobj = %self.full_name(id), error = %e, "autoplay failed");
                }
            }
        }
        Ok(root)
    }

    fn create_node(&mut self, parent: Option<GObjId>, node: &TreeNode, created: &mut Vec<GObjId>) -> GObjResult<GObjId> {
        let id = self.create_obj(&node.name, &node.gclass, node.kw.clone(), parent, node.flags())?;
        created.push(id);

        if let Some(parent) = parent {
            let gclass = self.gclass_of(id)?;
            let unset = self.gobj(id)?.attrs.get("subscriber").map_or(false, |v| *v == AttrValue::Pointer(None));
            let pointer = gclass.schema().get("subscriber").map_or(false, |d| d.dtype == DataType::Pointer);
            if pointer && unset {
                self.write_attr(id, "subscriber", parent)?;
            }
        }
        if node.disabled {
            self.disable(id)?;
        }
        for child in &node.zchilds {
            self.create_node(Some(id), child, created)?;
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use gobj_core::{AttrDesc, AttrFlags, EventFlags};
    use serde_json::json;

    use crate::GClass;

    fn setup() -> (Runtime, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (l1, l2) = (log.clone(), log.clone());
        let mut rt = Runtime::new();
        rt.register_class(
            GClass::builder("C_BOX")
                .attr(AttrDesc::new(DataType::String, "title", AttrFlags::WR, "Title"))
                .attr(AttrDesc::new(DataType::Pointer, "subscriber", AttrFlags::NONE, "Output events go here"))
                .event("EV_X", EventFlags::OUTPUT)
                .state("ST_IDLE", [])
                .on_start(move |rt, id| {
                    l1.borrow_mut().push(format!("start {}", rt.name(id).unwrap()));
                    0
                })
                .on_play(move |rt, id| {
                    l2.borrow_mut().push(format!("play {}", rt.name(id).unwrap()));
                    0
                })
                .build()
                .unwrap(),
        )
        .unwrap();
        (rt, log)
    }

    #[test]
    fn test_create_tree() {
        let (mut rt, log) = setup();
        let root = rt
            .create_tree(
                None,
                &json!({
                    "gclass": "C_BOX",
                    "name": "Root",
                    "as_service": true,
                    "autostart": true,
                    "autoplay": true,
                    "kw": {"title": "top"},
                    "zchilds": [
                        {"gclass": "C_BOX", "name": "a"},
                        {"gclass": "C_BOX", "name": "b", "disabled": true}
                    ]
                }),
            )
            .unwrap();

        assert_eq!(rt.find_service("root"), Some(root));
        assert_eq!(rt.read_str(root, "title"), Some("top"));
        let a = rt.child_by_name(root, "a").unwrap();
        let b = rt.child_by_name(root, "b").unwrap();
        assert_eq!(rt.read_pointer(a, "subscriber"), Some(root));
        assert_eq!(rt.read_pointer(root, "subscriber"), None);
        assert!(rt.gobj(b).unwrap().is_disabled());
        assert_eq!(log.borrow().as_slice(), ["start root", "start a", "play root"]);
    }

    #[test]
    fn test_failed_tree_is_rolled_back() {
        let (mut rt, _) = setup();
        let err = rt
            .create_tree(
                None,
                &json!({
                    "gclass": "C_BOX",
                    "name": "root",
                    "zchilds": [{"gclass": "C_BOX", "name": "a", "kw": {"subscriber": 5}}]
                }),
            )
            .unwrap_err();
        assert!(matches!(err, GObjError::TypeMismatch { .. }));
        assert_eq!(rt.instance_count(), 0);
    }

    #[test]
    fn test_invalid_tree_config() {
        let (mut rt, _) = setup();
        assert!(matches!(rt.create_tree(None, &json!({"name": "x"})), Err(GObjError::InvalidTree(_))));
        assert!(matches!(
            rt.create_tree(None, &json!({"gclass": "C_BOX", "zchilds": {}})),
            Err(GObjError::InvalidTree(_))
        ));
        assert!(matches!(rt.create_tree(None, &json!({"gclass": "C_NOPE"})), Err(GObjError::UnknownClass(_))));
    }
}
