//! Role-hierarchy authorization for invitations.

use crate::models::Role;

/// Fixed permission table: which target roles an actor may invite.
///
/// No role may invite its own rank or a higher one, and client_user may
/// invite nobody.
pub fn is_authorized_to_invite(actor: Role, target: Role) -> bool {
    use Role::*;

    match actor {
        SuperAdmin => matches!(target, SiteAdmin | Operator | ClientAdmin),
        SiteAdmin => matches!(target, Operator | ClientAdmin),
        Operator => matches!(target, ClientAdmin),
        ClientAdmin => matches!(target, ClientUser),
        ClientUser => false,
    }
}

/// Parse-then-check for callers holding a raw role code. Unknown codes
/// never reach the permission table and are unauthorized.
pub fn authorize_invite(actor_code: &str, target: Role) -> bool {
    actor_code
        .parse::<Role>()
        .map(|actor| is_authorized_to_invite(actor, target))
        .unwrap_or(false)
}

/// Invite management (listing, revocation) is limited to the admin ranks.
pub fn can_manage_invites(role: &Role) -> bool {
    matches!(role, Role::SuperAdmin | Role::SiteAdmin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use Role::*;

    const ALL_ROLES: [Role; 5] = [SuperAdmin, SiteAdmin, Operator, ClientAdmin, ClientUser];

    #[test]
    fn test_permission_table() {
        assert!(is_authorized_to_invite(SuperAdmin, SiteAdmin));
        assert!(is_authorized_to_invite(SuperAdmin, Operator));
        assert!(is_authorized_to_invite(SuperAdmin, ClientAdmin));
        assert!(!is_authorized_to_invite(SuperAdmin, ClientUser));

        assert!(is_authorized_to_invite(SiteAdmin, Operator));
        assert!(is_authorized_to_invite(SiteAdmin, ClientAdmin));
        assert!(!is_authorized_to_invite(SiteAdmin, SuperAdmin));
        assert!(!is_authorized_to_invite(SiteAdmin, ClientUser));

        assert!(is_authorized_to_invite(Operator, ClientAdmin));
        assert!(!is_authorized_to_invite(Operator, Operator));
        assert!(!is_authorized_to_invite(Operator, ClientUser));

        assert!(is_authorized_to_invite(ClientAdmin, ClientUser));
        assert!(!is_authorized_to_invite(ClientAdmin, ClientAdmin));
    }

    #[test]
    fn test_no_role_invites_its_own_rank() {
        for role in ALL_ROLES {
            assert!(
                !is_authorized_to_invite(role, role),
                "{} must not invite its own rank",
                role.as_str()
            );
        }
    }

    #[test]
    fn test_client_user_invites_nobody() {
        for target in ALL_ROLES {
            assert!(!is_authorized_to_invite(ClientUser, target));
        }
    }

    #[test]
    fn test_nobody_invites_upward() {
        assert!(!is_authorized_to_invite(SiteAdmin, SuperAdmin));
        assert!(!is_authorized_to_invite(Operator, SiteAdmin));
        assert!(!is_authorized_to_invite(ClientAdmin, Operator));
        assert!(!is_authorized_to_invite(ClientUser, ClientAdmin));
    }

    #[test]
    fn test_unknown_role_code_fails_closed() {
        for target in ALL_ROLES {
            assert!(!authorize_invite("root", target));
            assert!(!authorize_invite("", target));
        }
        assert!(authorize_invite("super_admin", Operator));
    }

    #[test]
    fn test_only_admin_ranks_manage_invites() {
        assert!(can_manage_invites(&SuperAdmin));
        assert!(can_manage_invites(&SiteAdmin));
        assert!(!can_manage_invites(&Operator));
        assert!(!can_manage_invites(&ClientAdmin));
        assert!(!can_manage_invites(&ClientUser));
    }
}
