use crate::{
    object::{Object, ReferenceKind},
    AmlError,
};
use alloc::{collections::BTreeMap, string::String, sync::Arc, vec::Vec};
use core::fmt;

/// A 4-character name segment: characters from `A`-`Z`, `0`-`9` and `_`,
/// padded with trailing underscores.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NameSeg(pub [u8; 4]);

impl NameSeg {
    pub fn from_bytes(bytes: [u8; 4]) -> Result<NameSeg, AmlError> {
        for byte in bytes {
            match byte {
                b'_' | b'0'..=b'9' | b'A'..=b'Z' => (),
                _ => return Err(AmlError::InvalidNameSeg(bytes)),
            }
        }
        Ok(NameSeg(bytes))
    }

    pub fn as_str(&self) -> &str {
        // Segments only ever hold the ASCII subset checked in `from_bytes`.
        core::str::from_utf8(&self.0).unwrap()
    }
}

impl fmt::Debug for NameSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameSeg({:?})", self.as_str())
    }
}

/// A handle to a namespace node. Handles are never reused (the handle of a
/// freed node will never point to a new node), so a stale handle can be
/// detected instead of silently aliasing an unrelated object.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct NodeId(u32);

impl NodeId {
    fn increment(&mut self) {
        self.0 += 1;
    }
}

/// The fixed scopes every namespace starts with.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PredefinedScope {
    Root,
    Gpe,
    Pr,
    Sb,
    Si,
    Tz,
    Gl,
    Os,
    Osi,
    Rev,
}

const PREDEFINED_SCOPES: [(PredefinedScope, [u8; 4]); 9] = [
    (PredefinedScope::Gpe, *b"_GPE"),
    (PredefinedScope::Pr, *b"_PR_"),
    (PredefinedScope::Sb, *b"_SB_"),
    (PredefinedScope::Si, *b"_SI_"),
    (PredefinedScope::Tz, *b"_TZ_"),
    (PredefinedScope::Gl, *b"_GL_"),
    (PredefinedScope::Os, *b"_OS_"),
    (PredefinedScope::Osi, *b"_OSI"),
    (PredefinedScope::Rev, *b"_REV"),
];

struct Node {
    name: NameSeg,
    parent: Option<NodeId>,
    /// Children in install order.
    children: Vec<NodeId>,
    object: Option<Arc<Object>>,
    installed: bool,
}

pub struct Namespace {
    /// A running count of ids, which are never reused. Incremented every time
    /// a node is allocated, so freeing a node can never recycle its id.
    next_id: NodeId,
    nodes: BTreeMap<NodeId, Node>,
    root: NodeId,
    predefined: [(PredefinedScope, NodeId); 9],
}

impl Namespace {
    pub fn new() -> Namespace {
        let mut namespace = Namespace {
            next_id: NodeId(0),
            nodes: BTreeMap::new(),
            root: NodeId(0),
            predefined: [(PredefinedScope::Root, NodeId(0)); 9],
        };

        let root = namespace.alloc(NameSeg(*b"\\___"), None);
        namespace.nodes.get_mut(&root).unwrap().installed = true;
        namespace.root = root;

        for (i, (scope, name)) in PREDEFINED_SCOPES.iter().enumerate() {
            let node = namespace.alloc(NameSeg(*name), Some(root));
            let object = Arc::new(Object::Reference {
                kind: ReferenceKind::Named,
                inner: Arc::new(Object::Uninitialized),
            });
            namespace.nodes.get_mut(&node).unwrap().object = Some(object);
            namespace.install(node).unwrap();
            namespace.predefined[i] = (*scope, node);
        }

        namespace
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get_predefined(&self, scope: PredefinedScope) -> NodeId {
        if scope == PredefinedScope::Root {
            return self.root;
        }
        self.predefined.iter().find(|(s, _)| *s == scope).unwrap().1
    }

    /// Allocate a node linked to (but not yet installed under) `parent`.
    pub fn alloc(&mut self, name: NameSeg, parent: Option<NodeId>) -> NodeId {
        let id = self.next_id;
        self.next_id.increment();
        self.nodes.insert(
            id,
            Node { name, parent, children: Vec::new(), object: None, installed: false },
        );
        id
    }

    /// Find a directly-named child of `parent`.
    pub fn find(&self, parent: NodeId, name: NameSeg) -> Option<NodeId> {
        let parent = self.nodes.get(&parent)?;
        parent.children.iter().copied().find(|child| {
            self.nodes.get(child).map(|node| node.name == name).unwrap_or(false)
        })
    }

    /// Hook a previously-allocated node into its parent's child list.
    pub fn install(&mut self, node: NodeId) -> Result<(), AmlError> {
        let parent = {
            let entry = self.nodes.get(&node).ok_or(AmlError::InvalidArgument)?;
            if entry.installed {
                return Err(AmlError::InvalidArgument);
            }
            entry.parent.ok_or(AmlError::InvalidArgument)?
        };

        self.nodes.get_mut(&parent).ok_or(AmlError::InvalidArgument)?.children.push(node);
        self.nodes.get_mut(&node).unwrap().installed = true;
        Ok(())
    }

    /// Detach an installed node from its parent and free it.
    pub fn uninstall(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes.get(&node).and_then(|n| n.parent) {
            if let Some(parent) = self.nodes.get_mut(&parent) {
                parent.children.retain(|child| *child != node);
            }
        }
        self.nodes.remove(&node);
    }

    /// Free a node that was never installed.
    pub fn free(&mut self, node: NodeId) {
        self.nodes.remove(&node);
    }

    pub fn parent_of(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    pub fn name_of(&self, node: NodeId) -> Option<NameSeg> {
        self.nodes.get(&node).map(|n| n.name)
    }

    pub fn object_of(&self, node: NodeId) -> Option<Arc<Object>> {
        self.nodes.get(&node).and_then(|n| n.object.clone())
    }

    pub fn set_object(&mut self, node: NodeId, object: Arc<Object>) {
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.object = Some(object);
        }
    }

    /// Walk an absolute dotted path (e.g. `\_SB.PCI0`) down from the root.
    /// Segments shorter than 4 characters are padded with underscores.
    pub fn get_by_path(&self, path: &str) -> Result<NodeId, AmlError> {
        let Some(rest) = path.strip_prefix('\\') else { return Err(AmlError::InvalidArgument) };

        let mut node = self.root;
        if rest.is_empty() {
            return Ok(node);
        }
        for part in rest.split('.') {
            if part.is_empty() || part.len() > 4 {
                return Err(AmlError::InvalidArgument);
            }
            let mut bytes = [b'_'; 4];
            bytes[..part.len()].copy_from_slice(part.as_bytes());
            node = self.find(node, NameSeg::from_bytes(bytes)?).ok_or(AmlError::ObjectNotFound)?;
        }
        Ok(node)
    }

    /// The absolute dotted path of a node, for diagnostics.
    pub fn path_of(&self, node: NodeId) -> String {
        if node == self.root {
            return String::from("\\");
        }

        let mut segments = Vec::new();
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root {
                break;
            }
            match self.nodes.get(&id) {
                Some(entry) => {
                    segments.push(entry.name);
                    current = entry.parent;
                }
                None => break,
            }
        }

        let mut path = String::from("\\");
        for (i, segment) in segments.iter().rev().enumerate() {
            if i > 0 {
                path.push('.');
            }
            path.push_str(segment.as_str());
        }
        path
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, node) in self.nodes.iter() {
            if node.installed {
                writeln!(f, "{}: {:?}", self.path_of(*id), node.object)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nameseg_validation() {
        assert!(NameSeg::from_bytes(*b"_SB_").is_ok());
        assert!(NameSeg::from_bytes(*b"PCI0").is_ok());
        assert!(NameSeg::from_bytes(*b"0BAD").is_ok());
        assert_eq!(NameSeg::from_bytes(*b"ab__"), Err(AmlError::InvalidNameSeg(*b"ab__")));
        assert_eq!(NameSeg::from_bytes(*b"A \0B"), Err(AmlError::InvalidNameSeg(*b"A \0B")));
    }

    #[test]
    fn test_predefined_scopes() {
        let namespace = Namespace::new();
        let sb = namespace.get_predefined(PredefinedScope::Sb);
        assert_eq!(namespace.find(namespace.root(), NameSeg(*b"_SB_")), Some(sb));
        assert_eq!(namespace.parent_of(sb), Some(namespace.root()));
        assert_eq!(namespace.path_of(sb), "\\_SB_");
    }

    #[test]
    fn test_install_uninstall() {
        let mut namespace = Namespace::new();
        let root = namespace.root();

        let node = namespace.alloc(NameSeg(*b"FOO_"), Some(root));
        assert_eq!(namespace.find(root, NameSeg(*b"FOO_")), None);

        namespace.install(node).unwrap();
        assert_eq!(namespace.find(root, NameSeg(*b"FOO_")), Some(node));

        namespace.uninstall(node);
        assert_eq!(namespace.find(root, NameSeg(*b"FOO_")), None);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut namespace = Namespace::new();
        let root = namespace.root();

        let first = namespace.alloc(NameSeg(*b"AAAA"), Some(root));
        namespace.free(first);
        let second = namespace.alloc(NameSeg(*b"AAAA"), Some(root));
        assert_ne!(first, second);
    }
}
