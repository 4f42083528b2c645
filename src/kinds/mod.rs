//! Adapters for the concrete entity kinds.

pub mod idp;
pub mod machine_key;
pub mod member;

pub use idp::{AzureAd, GithubEs, GitlabSelfHosted, IdpAdapter, IdpFlavor};
pub use machine_key::MachineKeyAdapter;
pub use member::{MemberAdapter, MemberScope};

use crate::error::InputError;
use crate::resource::{DeclaredState, ResourceKind};

/// Runs the kind-specific input checks create would run, offline.
///
/// # Errors
///
/// Returns the first input error found.
pub fn validate_declared(kind: ResourceKind, state: &DeclaredState) -> Result<(), InputError> {
    match kind {
        ResourceKind::MachineKey => machine_key::validate(state),
        ResourceKind::OrgIdpAzureAd => AzureAd::settings_from_state(state).map(|_| ()),
        ResourceKind::OrgIdpGithubEs => GithubEs::settings_from_state(state).map(|_| ()),
        ResourceKind::IdpGitlabSelfHosted => GitlabSelfHosted::settings_from_state(state).map(|_| ()),
        ResourceKind::InstanceMember => member::validate(MemberScope::Instance, state),
        ResourceKind::OrgMember => member::validate(MemberScope::Organization, state),
        ResourceKind::ProjectMember => member::validate(MemberScope::Project, state),
    }
}
