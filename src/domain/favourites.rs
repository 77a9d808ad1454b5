use super::{FavouriteEdge, ProductId};

/// Result of adding a favourite. Re-adding one the user already has is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavouriteAck {
    Added,
    AlreadyPresent,
}

pub fn contains_product(edges: &[FavouriteEdge], product_id: &ProductId) -> bool {
    edges.iter().any(|edge| &edge.product_id == product_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FavouriteId;

    #[test]
    fn finds_existing_edge() {
        let edges = vec![FavouriteEdge {
            id: FavouriteId::new("f1"),
            product_id: ProductId::new("p9"),
            user_id: None,
            product: None,
        }];
        assert!(contains_product(&edges, &ProductId::new("p9")));
        assert!(!contains_product(&edges, &ProductId::new("p1")));
    }
}
