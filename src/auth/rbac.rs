/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Defines the three storefront roles and their permissions. Permissions
 * use a `resource:action` shape; `resource:*` grants every action on a
 * resource and admins hold wildcards across the board.
 */

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Permission names used by route gates. Kept as constants so routes and
/// role definitions cannot drift apart silently.
pub mod perms {
    pub const PRODUCTS_MANAGE: &str = "products:manage";
    pub const COUPONS_MANAGE: &str = "coupons:manage";
    pub const REVIEWS_MODERATE: &str = "reviews:moderate";
    pub const TICKETS_WORK: &str = "tickets:work";
    pub const USERS_READ: &str = "users:read";
}

/// Role definition with associated permissions
#[derive(Debug, Clone)]
pub struct Role {
    pub name: String,
    pub description: String,
    pub permissions: Vec<String>,
}

lazy_static! {
    pub static ref ROLES: HashMap<String, Role> = {
        let mut roles = HashMap::new();

        roles.insert(
            "admin".to_string(),
            Role {
                name: "admin".to_string(),
                description: "Administrator with full access".to_string(),
                permissions: vec![
                    "admin:*".to_string(),
                    "users:*".to_string(),
                    "products:*".to_string(),
                    "coupons:*".to_string(),
                    "reviews:*".to_string(),
                    "carts:*".to_string(),
                    "orders:*".to_string(),
                    "wishlists:*".to_string(),
                    "tickets:*".to_string(),
                ],
            },
        );

        roles.insert(
            "agent".to_string(),
            Role {
                name: "agent".to_string(),
                description: "Support agent working tickets and moderation".to_string(),
                permissions: vec![
                    "products:read".to_string(),
                    "reviews:read".to_string(),
                    perms::REVIEWS_MODERATE.to_string(),
                    "orders:read".to_string(),
                    "tickets:read".to_string(),
                    perms::TICKETS_WORK.to_string(),
                    perms::USERS_READ.to_string(),
                ],
            },
        );

        roles.insert(
            "customer".to_string(),
            Role {
                name: "customer".to_string(),
                description: "Shopper acting on their own resources".to_string(),
                permissions: vec![
                    "products:read".to_string(),
                    "reviews:read".to_string(),
                    "reviews:write".to_string(),
                    "carts:write".to_string(),
                    "orders:write".to_string(),
                    "wishlists:write".to_string(),
                    "tickets:write".to_string(),
                ],
            },
        );

        roles
    };
}

/// Permissions granted by a role, empty for an unknown role name.
pub fn permissions_for_role(role_name: &str) -> Vec<String> {
    match ROLES.get(role_name) {
        Some(role) => role.permissions.clone(),
        None => {
            warn!("Role not found: {}", role_name);
            vec![]
        }
    }
}

/// Check whether a held permission satisfies a required one, honoring
/// `resource:*` and bare `*` wildcards.
pub fn permission_matches(held: &str, required: &str) -> bool {
    if held == required {
        return true;
    }

    if let Some(prefix) = held.strip_suffix(":*") {
        if required.starts_with(prefix) {
            return true;
        }
    }

    held == "*"
}

/// RBAC lookup service over the static role table
#[derive(Clone, Default)]
pub struct RbacService;

impl RbacService {
    pub fn new() -> Self {
        Self
    }

    pub fn get_role(&self, role_name: &str) -> Option<&Role> {
        ROLES.get(role_name)
    }

    pub fn get_all_roles(&self) -> Vec<&Role> {
        ROLES.values().collect()
    }

    /// Union of permissions across several roles
    pub fn get_permissions_for_roles(&self, role_names: &[String]) -> HashSet<String> {
        let mut permissions = HashSet::new();
        for role_name in role_names {
            for perm in permissions_for_role(role_name) {
                permissions.insert(perm);
            }
        }
        permissions
    }

    pub fn check_permission(&self, held: &str, required: &str) -> bool {
        permission_matches(held, required)
    }
}
