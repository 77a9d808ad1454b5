//! Navigation trees: a list of navigation groups, each holding a two-level category forest.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use super::{Category, CategoryId, NavigationTree};

/// A top-level category together with its direct children, in server order.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryNode {
    pub category: Category,
    pub children: Vec<Category>,
}

/// True when there is nothing to browse: no navigation groups, or none of them has a category.
pub fn is_catalog_empty(trees: &[NavigationTree]) -> bool {
    trees.iter().all(|tree| tree.categories.is_empty())
}

/// Total number of categories across all navigation groups.
pub fn category_count(trees: &[NavigationTree]) -> usize {
    trees.iter().map(|tree| tree.categories.len()).sum()
}

/// Enforce the two-level forest shape on every navigation group.
///
/// A category survives when it is top-level, or when its parent lives in the same navigation
/// and is itself top-level. Self-parents, dangling parents, cycles, grandchildren and duplicate
/// ids are dropped (first occurrence wins) and logged.
pub fn normalize(trees: Vec<NavigationTree>) -> Vec<NavigationTree> {
    trees.into_iter().map(normalize_tree).collect()
}

fn normalize_tree(mut tree: NavigationTree) -> NavigationTree {
    let mut parents: HashMap<CategoryId, Option<CategoryId>> = HashMap::new();
    for category in &tree.categories {
        parents.entry(category.id).or_insert(category.parent_id);
    }

    let mut seen = HashSet::new();
    let before = tree.categories.len();
    tree.categories.retain(|category| {
        if !seen.insert(category.id) {
            warn!(
                navigation = %tree.slug,
                category_id = %category.id,
                "Dropping duplicate category"
            );
            return false;
        }
        let Some(parent_id) = category.parent_id else {
            return true;
        };
        let keep = parent_id != category.id
            && matches!(parents.get(&parent_id), Some(None));
        if !keep {
            warn!(
                navigation = %tree.slug,
                category_id = %category.id,
                parent_id = %parent_id,
                "Dropping category outside the two-level forest"
            );
        }
        keep
    });

    if tree.categories.len() != before {
        warn!(
            navigation = %tree.slug,
            dropped = before - tree.categories.len(),
            "Navigation categories repaired"
        );
    }
    tree
}

/// Group a navigation's categories under their top-level parents.
///
/// Expects normalised input; children whose parent is missing are skipped.
pub fn category_tree(tree: &NavigationTree) -> Vec<CategoryNode> {
    let mut nodes: Vec<CategoryNode> = tree
        .categories
        .iter()
        .filter(|category| category.parent_id.is_none())
        .map(|category| CategoryNode {
            category: category.clone(),
            children: Vec::new(),
        })
        .collect();

    let positions: HashMap<CategoryId, usize> = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.category.id, index))
        .collect();

    for category in &tree.categories {
        if let Some(parent_id) = category.parent_id
            && let Some(&index) = positions.get(&parent_id)
        {
            nodes[index].children.push(category.clone());
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NavigationId;

    fn category(id: i64, parent: Option<i64>) -> Category {
        Category {
            id: CategoryId(id),
            title: format!("Category {id}"),
            slug: format!("category-{id}"),
            parent_id: parent.map(CategoryId),
        }
    }

    fn tree(categories: Vec<Category>) -> NavigationTree {
        NavigationTree {
            id: NavigationId(1),
            title: "Books".to_string(),
            slug: "books".to_string(),
            categories,
        }
    }

    fn ids(tree: &NavigationTree) -> Vec<i64> {
        tree.categories.iter().map(|c| c.id.0).collect()
    }

    #[test]
    fn empty_when_no_navigation_or_no_categories() {
        assert!(is_catalog_empty(&[]));
        assert!(is_catalog_empty(&[tree(vec![]), tree(vec![])]));
        assert!(!is_catalog_empty(&[tree(vec![]), tree(vec![category(1, None)])]));
    }

    #[test]
    fn keeps_valid_two_level_forest_in_order() {
        let input = tree(vec![
            category(1, None),
            category(2, Some(1)),
            category(3, None),
            category(4, Some(3)),
        ]);
        let normalized = normalize(vec![input]);
        assert_eq!(ids(&normalized[0]), vec![1, 2, 3, 4]);
    }

    #[test]
    fn drops_dangling_self_and_deep_parents() {
        let input = tree(vec![
            category(1, None),
            category(2, Some(1)),
            category(3, Some(2)),  // depth 3
            category(4, Some(99)), // dangling
            category(5, Some(5)),  // self-parent
        ]);
        let normalized = normalize(vec![input]);
        assert_eq!(ids(&normalized[0]), vec![1, 2]);
    }

    #[test]
    fn drops_cycles_and_duplicates() {
        let input = tree(vec![
            category(7, Some(8)),
            category(8, Some(7)),
            category(9, None),
            category(9, None),
        ]);
        let normalized = normalize(vec![input]);
        assert_eq!(ids(&normalized[0]), vec![9]);
    }

    #[test]
    fn parent_must_live_in_same_navigation() {
        let first = tree(vec![category(1, None)]);
        let mut second = tree(vec![category(2, Some(1))]);
        second.id = NavigationId(2);
        let normalized = normalize(vec![first, second]);
        assert!(normalized[1].categories.is_empty());
    }

    #[test]
    fn category_tree_groups_children_under_parents() {
        let input = tree(vec![
            category(1, None),
            category(3, None),
            category(2, Some(1)),
            category(4, Some(1)),
        ]);
        let nodes = category_tree(&input);
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].category.id, CategoryId(1));
        let children: Vec<i64> = nodes[0].children.iter().map(|c| c.id.0).collect();
        assert_eq!(children, vec![2, 4]);
        assert!(nodes[1].children.is_empty());
        assert_eq!(category_count(&[input]), 4);
    }
}
