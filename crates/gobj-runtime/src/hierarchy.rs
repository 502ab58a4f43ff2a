//! Hierarchy manager
//!
//! Parents own their children through the arena; a child only records its
//! parent's id. Structural changes are reported to the parent through the
//! `child_added` / `child_removed` hooks.

use tracing::{debug, warn};

use gobj_core::{ClassFlags, GObjError, GObjId, GObjResult};

use crate::Runtime;

impl Runtime {
    /// Append a root instance to the children of `parent`
    pub fn add_child(&mut self, parent: GObjId, child: GObjId) -> GObjResult<()> {
        if let Some(current) = self.live(child)?.parent {
            return Err(GObjError::AlreadyLinked { parent: current, child });
        }
        self.check_link(parent, child)?;
        self.unlink(child)?;
        self.link(parent, child)?;
        self.notify_child_added(parent, child);
        Ok(())
    }

    /// Detach `child` from `parent`. The child becomes a root instance.
    pub fn remove_child(&mut self, parent: GObjId, child: GObjId) -> GObjResult<()> {
        self.live(parent)?;
        if self.live(child)?.parent != Some(parent) {
            return Err(GObjError::NotAChild { parent, child });
        }
        let name = self.gobj(child)?.name.clone();
        self.check_unique_name(None, &name, Some(child))?;

        self.notify_child_removed(parent, child);
        self.unlink(child)?;
        self.roots.push(child);
        Ok(())
    }

    /// Move `child` under `new_parent` in one step.
    ///
    /// Every check runs before anything changes: on error the tree is left
    /// as it was. On success `child_removed` fires on the old parent and
    /// `child_added` on the new one.
    pub fn reparent(&mut self, child: GObjId, new_parent: GObjId) -> GObjResult<()> {
        let old_parent = self.live(child)?.parent;
        if old_parent == Some(new_parent) {
            return Ok(());
        }
        self.check_link(new_parent, child)?;

        if let Some(old_parent) = old_parent {
            self.notify_child_removed(old_parent, child);
        }
        self.unlink(child)?;
        self.link(new_parent, child)?;
        self.notify_child_added(new_parent, child);
        Ok(())
    }

    fn check_link(&self, parent: GObjId, child: GObjId) -> GObjResult<()> {
        self.live(parent)?;
        let gobj = self.live(child)?;
        if parent == child || self.is_ancestor(child, parent) {
            return Err(GObjError::HierarchyCycle { child });
        }
        self.check_unique_name(Some(parent), &gobj.name, Some(child))
    }

    fn link(&mut self, parent: GObjId, child: GObjId) -> GObjResult<()> {
        self.gobj_mut(parent)?.children.push(child);
        self.gobj_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Is `ancestor` on the parent chain of `id`?
    pub fn is_ancestor(&self, ancestor: GObjId, id: GObjId) -> bool {
        let mut cursor = self.arena.get(id).and_then(|g| g.parent);
        while let Some(cur) = cursor {
            if cur == ancestor {
                return true;
            }
            cursor = self.arena.get(cur).and_then(|g| g.parent);
        }
        false
    }

    pub(crate) fn notify_child_added(&mut self, parent: GObjId, child: GObjId) {
        let Ok(gclass) = self.gclass_of(parent) else {
            return;
        };
        if let Some(hook) = &gclass.hooks.child_added {
            hook(self, parent, child);
        }
    }

    pub(crate) fn notify_child_removed(&mut self, parent: GObjId, child: GObjId) {
        let Ok(gclass) = self.gclass_of(parent) else {
            return;
        };
        if let Some(hook) = &gclass.hooks.child_removed {
            hook(self, parent, child);
        }
    }

    // ---------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------

    pub fn parent(&self, id: GObjId) -> Option<GObjId> {
        self.arena.get(id)?.parent
    }

    /// Children in insertion order
    pub fn children(&self, id: GObjId) -> Vec<GObjId> {
        self.arena.get(id).map(|g| g.children.clone()).unwrap_or_default()
    }

    pub fn child_by_name(&self, parent: GObjId, name: &str) -> Option<GObjId> {
        let name = name.to_lowercase();
        self.arena
            .get(parent)?
            .children
            .iter()
            .copied()
            .find(|&c| self.arena.get(c).map_or(false, |g| g.name == name))
    }

    /// Descendants of `id` in pre-order, `id` excluded
    pub fn descendants(&self, id: GObjId) -> Vec<GObjId> {
        let mut out = Vec::new();
        let mut stack: Vec<GObjId> = self.children(id).into_iter().rev().collect();
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend(self.children(cur).into_iter().rev());
        }
        out
    }

    // ---------------------------------------------------------------
    // Tree-wide lifecycle
    // ---------------------------------------------------------------

    /// Start `id` and then its descendants, parents first.
    ///
    /// Disabled subtrees and children whose class has `MANUAL_START` are
    /// skipped.
    pub fn start_tree(&mut self, id: GObjId) -> GObjResult<()> {
        let gobj = self.live(id)?;
        if gobj.disabled {
            debug!(gobj = %self.full_name(id), "start_tree: disabled subtree skipped");
            return Ok(());
        }
        if !gobj.running {
            self.start(id)?;
        }
        self.start_children(id)
    }

    /// `start_tree` over each child of `id`
    pub fn start_children(&mut self, id: GObjId) -> GObjResult<()> {
        for child in self.children(id) {
            let Ok(gobj) = self.live(child) else {
                continue;
            };
            if gobj.gclass.flags().contains(ClassFlags::MANUAL_START) {
                continue;
            }
            if let Err(e) = self.start_tree(child) {
                warn!(gobj = %self.full_name(child), error = %e, "start_tree: cannot start child");
            }
        }
        Ok(())
    }

    /// Stop the descendants of `id`, children before parents, then `id`
    pub fn stop_tree(&mut self, id: GObjId) -> GObjResult<()> {
        self.live(id)?;
        self.stop_children(id)?;
        self.stop(id)?;
        Ok(())
    }

    /// `stop_tree` over each child of `id`
    pub fn stop_children(&mut self, id: GObjId) -> GObjResult<()> {
        for child in self.children(id) {
            if !self.is_alive(child) {
                continue;
            }
            if let Err(e) = self.stop_tree(child) {
                warn!(gobj = %self.full_name(child), error = %e, "stop_tree: cannot stop child");
            }
        }
        Ok(())
    }

    /// Play `id` and then its running descendants
    pub fn play_tree(&mut self, id: GObjId) -> GObjResult<()> {
        let gobj = self.live(id)?;
        if gobj.disabled {
            return Ok(());
        }
        if !gobj.playing {
            self.play(id)?;
        }
        for child in self.children(id) {
            let running = self.live(child).map_or(false, |g| g.running);
            if running {
                self.play_tree(child)?;
            }
        }
        Ok(())
    }

    /// Pause the descendants of `id`, children before parents, then `id`
    pub fn pause_tree(&mut self, id: GObjId) -> GObjResult<()> {
        self.live(id)?;
        for child in self.children(id) {
            if self.is_alive(child) {
                self.pause_tree(child)?;
            }
        }
        self.pause(id)?;
        Ok(())
    }

    /// Destroy every child of `id`, last first.
    ///
    /// Works on an instance being destroyed too: `destroy` uses it after
    /// `id` has been marked.
    pub fn destroy_children(&mut self, id: GObjId) -> GObjResult<()> {
        let children = self.gobj(id)?.children.clone();
        for child in children.into_iter().rev() {
            let destroying = self.arena.get(child).map_or(true, |g| g.destroying);
            if !destroying {
                self.destroy(child)?;
            }
        }
        Ok(())
    }
}
