//! Market class hierarchy
//!
//! Market classes are dotted category paths such as `hauling.ICE`. Together
//! they define a fixed tree: every path segment but the last is an interior
//! category, the last segment is a leaf holding the composite vehicles of
//! that market class.
//!
//! ```text
//! root
//! ├── hauling
//! │   ├── BEV  -> [hauling.BEV.truck]
//! │   └── ICE  -> [hauling.ICE.truck]
//! └── non_hauling
//!     ├── BEV  -> [non_hauling.BEV.car]
//!     └── ICE  -> [non_hauling.ICE.car, non_hauling.ICE.truck]
//! ```
//!
//! The shape comes from `MarketClassConfig` and never changes during a run;
//! only leaf contents differ from year to year.

use crate::models::composite::CompositeVehicle;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Separator between category names in a market class path
pub const PATH_SEPARATOR: char = '.';

/// Errors in market class configuration or population
#[derive(Debug, Error, PartialEq)]
pub enum MarketClassError {
    #[error("No market classes configured")]
    Empty,

    #[error("No regulatory classes configured")]
    NoRegClasses,

    #[error("Market class '{0}' has an empty category name")]
    EmptySegment(String),

    #[error("Market class '{0}' is configured more than once")]
    Duplicate(String),

    #[error("Category '{0}' is both a market class and a parent of another market class")]
    LeafInteriorConflict(String),

    #[error("Unknown market class: {0}")]
    UnknownMarketClass(String),
}

/// Join a parent category path and a child name
///
/// # Example
/// ```
/// use compliance_search_core_rs::models::market_class::category_path;
///
/// assert_eq!(category_path("", "hauling"), "hauling");
/// assert_eq!(category_path("hauling", "ICE"), "hauling.ICE");
/// ```
pub fn category_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}{}{}", parent, PATH_SEPARATOR, name)
    }
}

/// Every ancestor path of a market class, outermost first, the class itself last
pub fn path_chain(market_class_id: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut current = String::new();
    for segment in market_class_id.split(PATH_SEPARATOR) {
        current = category_path(&current, segment);
        chain.push(current.clone());
    }
    chain
}

/// Fixed market category configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketClassConfig {
    /// Market class paths (leaves of the tree)
    pub market_classes: Vec<String>,

    /// Category names whose shares the producer searches
    #[serde(default)]
    pub responsive_categories: BTreeSet<String>,

    /// Regulatory classes, in composite ordering
    pub reg_classes: Vec<String>,
}

impl MarketClassConfig {
    /// Check the configuration describes a well-formed tree
    pub fn validate(&self) -> Result<(), MarketClassError> {
        if self.market_classes.is_empty() {
            return Err(MarketClassError::Empty);
        }
        if self.reg_classes.is_empty() {
            return Err(MarketClassError::NoRegClasses);
        }

        let mut seen = BTreeSet::new();
        for mc in &self.market_classes {
            if mc.split(PATH_SEPARATOR).any(str::is_empty) {
                return Err(MarketClassError::EmptySegment(mc.clone()));
            }
            if !seen.insert(mc.as_str()) {
                return Err(MarketClassError::Duplicate(mc.clone()));
            }
        }

        for mc in &self.market_classes {
            let chain = path_chain(mc);
            for ancestor in &chain[..chain.len() - 1] {
                if seen.contains(ancestor.as_str()) {
                    return Err(MarketClassError::LeafInteriorConflict(ancestor.clone()));
                }
            }
        }

        Ok(())
    }

    /// Whether a category name is searched by the producer
    pub fn is_responsive(&self, category: &str) -> bool {
        self.responsive_categories.contains(category)
    }

    /// Build the empty tree for this configuration
    pub fn empty_tree(&self) -> Result<MarketClassTree, MarketClassError> {
        self.validate()?;

        let mut root = BTreeMap::new();
        for mc in &self.market_classes {
            let segments: Vec<&str> = mc.split(PATH_SEPARATOR).collect();
            insert_path(&mut root, &segments);
        }

        Ok(MarketClassTree { root })
    }
}

fn insert_path(children: &mut BTreeMap<String, MarketClassNode>, segments: &[&str]) {
    match segments {
        [] => {}
        [leaf] => {
            children
                .entry(leaf.to_string())
                .or_insert_with(|| MarketClassNode::Leaf(Vec::new()));
        }
        [head, rest @ ..] => {
            let node = children
                .entry(head.to_string())
                .or_insert_with(|| MarketClassNode::Interior(BTreeMap::new()));
            if let MarketClassNode::Interior(grandchildren) = node {
                insert_path(grandchildren, rest);
            }
        }
    }
}

/// A node of the market class tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MarketClassNode {
    /// Category with named sub-categories
    Interior(BTreeMap<String, MarketClassNode>),

    /// Market class holding its composite vehicles
    Leaf(Vec<CompositeVehicle>),
}

/// Market class tree, rooted at an unnamed interior node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketClassTree {
    root: BTreeMap<String, MarketClassNode>,
}

impl MarketClassTree {
    /// Top-level categories
    pub fn root(&self) -> &BTreeMap<String, MarketClassNode> {
        &self.root
    }

    /// Place a composite vehicle under its market class leaf
    pub fn populate(&mut self, vehicle: CompositeVehicle) -> Result<(), MarketClassError> {
        let mut children = &mut self.root;
        let segments: Vec<&str> = vehicle.market_class_id.split(PATH_SEPARATOR).collect();

        for (i, segment) in segments.iter().enumerate() {
            let is_last = i + 1 == segments.len();
            match children.get_mut(*segment) {
                Some(MarketClassNode::Interior(next)) if !is_last => children = next,
                Some(MarketClassNode::Leaf(list)) if is_last => {
                    list.push(vehicle);
                    return Ok(());
                }
                _ => break,
            }
        }

        Err(MarketClassError::UnknownMarketClass(vehicle.market_class_id.clone()))
    }

    /// All composite vehicles, depth-first in category order
    pub fn composite_vehicles(&self) -> Vec<&CompositeVehicle> {
        fn walk<'a>(children: &'a BTreeMap<String, MarketClassNode>, out: &mut Vec<&'a CompositeVehicle>) {
            for node in children.values() {
                match node {
                    MarketClassNode::Interior(next) => walk(next, out),
                    MarketClassNode::Leaf(list) => out.extend(list.iter()),
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Visit every composite vehicle mutably, in the same order as `composite_vehicles()`
    pub fn for_each_vehicle_mut(&mut self, mut f: impl FnMut(&mut CompositeVehicle)) {
        fn walk(children: &mut BTreeMap<String, MarketClassNode>, f: &mut dyn FnMut(&mut CompositeVehicle)) {
            for node in children.values_mut() {
                match node {
                    MarketClassNode::Interior(next) => walk(next, f),
                    MarketClassNode::Leaf(list) => list.iter_mut().for_each(&mut *f),
                }
            }
        }

        walk(&mut self.root, &mut f);
    }

    /// Market class paths of all leaves, depth-first in category order
    pub fn market_class_paths(&self) -> Vec<String> {
        fn walk(children: &BTreeMap<String, MarketClassNode>, parent: &str, out: &mut Vec<String>) {
            for (name, node) in children {
                let path = category_path(parent, name);
                match node {
                    MarketClassNode::Interior(next) => walk(next, &path, out),
                    MarketClassNode::Leaf(_) => out.push(path),
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MarketClassConfig {
        MarketClassConfig {
            market_classes: vec![
                "hauling.ICE".to_string(),
                "hauling.BEV".to_string(),
                "non_hauling.ICE".to_string(),
                "non_hauling.BEV".to_string(),
            ],
            responsive_categories: ["ICE", "BEV"].iter().map(|s| s.to_string()).collect(),
            reg_classes: vec!["car".to_string(), "truck".to_string()],
        }
    }

    #[test]
    fn test_path_chain() {
        assert_eq!(path_chain("hauling.ICE"), vec!["hauling", "hauling.ICE"]);
        assert_eq!(path_chain("A"), vec!["A"]);
    }

    #[test]
    fn test_empty_tree_shape() {
        let tree = config().empty_tree().unwrap();
        assert_eq!(tree.root().len(), 2);
        assert_eq!(
            tree.market_class_paths(),
            vec!["hauling.BEV", "hauling.ICE", "non_hauling.BEV", "non_hauling.ICE"]
        );
        assert!(tree.composite_vehicles().is_empty());
    }

    #[test]
    fn test_leaf_interior_conflict_rejected() {
        let mut cfg = config();
        cfg.market_classes.push("hauling".to_string());
        assert_eq!(
            cfg.validate(),
            Err(MarketClassError::LeafInteriorConflict("hauling".to_string()))
        );
    }

    #[test]
    fn test_responsive_lookup() {
        let cfg = config();
        assert!(cfg.is_responsive("ICE"));
        assert!(!cfg.is_responsive("hauling"));
    }
}
