//! B+Tree Node, Generic operations, and Cursor (§4.F-§4.H).

pub mod btree;
pub mod cursor;
pub mod node;

pub use btree::BTree;
pub use cursor::{scan_asc, scan_desc, Cursor, ScanVisitor};
pub use node::{remove_child_ref, BTreeNode, BTreeNodeView, Fence, HINT_COUNT};
