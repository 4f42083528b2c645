//! OAuth identity providers.
//!
//! Every provider type shares the same add/update/get/delete shape and the
//! same linking options; an [`IdpFlavor`] supplies the type-specific
//! settings and where they live on the wire.

mod azure_ad;
mod github_es;
mod gitlab;

pub use azure_ad::AzureAd;
pub use github_es::GithubEs;
pub use gitlab::GitlabSelfHosted;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use tracing::{debug, info};

use crate::error::{ApiError, InputError, Result};
use crate::resource::{
    absent_ok, has_changes, AttrValue, DeclaredState, FieldSpec, FieldType, ImportFormat,
    ReadOutcome, Resource, ResourceKind, Scope,
};
use crate::zitadel::types::{
    AddProviderResponse, DetailsResponse, GetProviderResponse, ProviderClientConfig,
    ProviderOptions, ProviderRequest,
};
use crate::zitadel::{ProviderContext, ScopedClient, ORG_ID_FIELD};

/// Display name.
pub const NAME: &str = "name";
/// OAuth client ID.
pub const CLIENT_ID: &str = "client_id";
/// OAuth client secret.
pub const CLIENT_SECRET: &str = "client_secret";
/// Requested scopes.
pub const SCOPES: &str = "scopes";
/// Users may link existing accounts.
pub const IS_LINKING_ALLOWED: &str = "is_linking_allowed";
/// Users may create accounts.
pub const IS_CREATION_ALLOWED: &str = "is_creation_allowed";
/// Accounts are created on first login.
pub const IS_AUTO_CREATION: &str = "is_auto_creation";
/// Accounts are refreshed on every login.
pub const IS_AUTO_UPDATE: &str = "is_auto_update";

/// Owning organization, filled in from the service when omitted.
pub(crate) const ORG_ID_SPEC: FieldSpec =
    FieldSpec::optional_computed(ORG_ID_FIELD, FieldType::String).forces_new();
pub(crate) const NAME_SPEC: FieldSpec = FieldSpec::required(NAME, FieldType::String);
pub(crate) const CLIENT_ID_SPEC: FieldSpec = FieldSpec::required(CLIENT_ID, FieldType::String);
pub(crate) const CLIENT_SECRET_SPEC: FieldSpec =
    FieldSpec::required(CLIENT_SECRET, FieldType::String).secret();
pub(crate) const SCOPES_SPEC: FieldSpec = FieldSpec::optional(SCOPES, FieldType::StringSet);
pub(crate) const IS_LINKING_ALLOWED_SPEC: FieldSpec =
    FieldSpec::optional(IS_LINKING_ALLOWED, FieldType::Bool);
pub(crate) const IS_CREATION_ALLOWED_SPEC: FieldSpec =
    FieldSpec::optional(IS_CREATION_ALLOWED, FieldType::Bool);
pub(crate) const IS_AUTO_CREATION_SPEC: FieldSpec =
    FieldSpec::optional(IS_AUTO_CREATION, FieldType::Bool);
pub(crate) const IS_AUTO_UPDATE_SPEC: FieldSpec =
    FieldSpec::optional(IS_AUTO_UPDATE, FieldType::Bool);

/// One provider type.
pub trait IdpFlavor: Send + Sync + 'static {
    /// Entity kind served.
    const KIND: ResourceKind;
    /// Instance or organization provider.
    const SCOPE: Scope;
    /// Field surface.
    const FIELDS: &'static [FieldSpec];
    /// Import Key format.
    const IMPORT: &'static ImportFormat;
    /// Path segment after `idps/` on add and update.
    const PATH: &'static str;
    /// Key of the type-specific block in the provider's `config`.
    const CONFIG_KEY: &'static str;

    /// Type-specific settings, serialized next to the shared fields.
    type Settings: Serialize + DeserializeOwned + Send + Sync;

    /// Reads the settings from declared state.
    ///
    /// # Errors
    ///
    /// Returns an input error for missing or malformed settings.
    fn settings_from_state(state: &DeclaredState) -> std::result::Result<Self::Settings, InputError>;

    /// Writes settings reported by the service into declared state.
    fn settings_into_state(settings: Self::Settings, state: &mut DeclaredState);
}

/// Validated add/update input.
struct IdpSpec<S> {
    name: String,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    options: ProviderOptions,
    settings: S,
}

impl<S> IdpSpec<S> {
    fn from_state<F: IdpFlavor<Settings = S>>(state: &DeclaredState) -> std::result::Result<Self, InputError> {
        Ok(Self {
            name: state.str_required(NAME)?.to_string(),
            client_id: state.str_required(CLIENT_ID)?.to_string(),
            client_secret: state.str_required(CLIENT_SECRET)?.to_string(),
            scopes: state.set_or_empty(SCOPES)?.into_iter().collect(),
            options: ProviderOptions {
                is_linking_allowed: state.bool_or_default(IS_LINKING_ALLOWED)?,
                is_creation_allowed: state.bool_or_default(IS_CREATION_ALLOWED)?,
                is_auto_creation: state.bool_or_default(IS_AUTO_CREATION)?,
                is_auto_update: state.bool_or_default(IS_AUTO_UPDATE)?,
            },
            settings: F::settings_from_state(state)?,
        })
    }

    fn into_request(self) -> ProviderRequest<S> {
        ProviderRequest {
            name: self.name,
            client_id: self.client_id,
            client_secret: self.client_secret,
            scopes: self.scopes,
            provider_options: self.options,
            settings: self.settings,
        }
    }
}

/// Adapter for any provider type.
pub struct IdpAdapter<F> {
    ctx: ProviderContext,
    flavor: PhantomData<fn() -> F>,
}

impl<F: IdpFlavor> IdpAdapter<F> {
    /// Creates the adapter.
    #[must_use]
    pub const fn new(ctx: ProviderContext) -> Self {
        Self {
            ctx,
            flavor: PhantomData,
        }
    }

    const fn root() -> &'static str {
        match F::SCOPE {
            Scope::Instance => "/admin/v1",
            Scope::Organization => "/management/v1",
        }
    }

    fn client(&self, declared: &DeclaredState) -> ScopedClient {
        match F::SCOPE {
            Scope::Instance => self.ctx.instance_scope(),
            Scope::Organization => self.ctx.org_scope(declared),
        }
    }

    fn record_owner(state: &mut DeclaredState, owner: Option<String>) {
        if let Some(owner) = owner.filter(|o| F::SCOPE == Scope::Organization && !o.is_empty()) {
            state.set(ORG_ID_FIELD, owner);
        }
    }
}

impl<F> std::fmt::Debug for IdpAdapter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdpAdapter").field("ctx", &self.ctx).finish()
    }
}

fn decode_block<T: DeserializeOwned>(block: &Value, what: &str) -> std::result::Result<T, ApiError> {
    serde_json::from_value(block.clone())
        .map_err(|e| ApiError::invalid_response(format!("unexpected {what}: {e}")))
}

#[async_trait]
impl<F: IdpFlavor> Resource for IdpAdapter<F> {
    fn kind(&self) -> ResourceKind {
        F::KIND
    }

    async fn create(&self, declared: &DeclaredState) -> Result<DeclaredState> {
        let request = IdpSpec::<F::Settings>::from_state::<F>(declared)?.into_request();
        let path = format!("{}/idps/{}", Self::root(), F::PATH);

        let response: AddProviderResponse = self.client(declared).post(&path, &request).await?;
        info!("Created {} '{}' (ID: {})", F::KIND, request.name, response.id);

        let mut state = declared.clone().with_id(response.id);
        if !state.is_set(ORG_ID_FIELD) {
            Self::record_owner(&mut state, response.details.resource_owner);
        }
        Ok(state)
    }

    async fn read(&self, declared: &DeclaredState) -> Result<ReadOutcome> {
        let path = format!("{}/idps/{}", Self::root(), declared.id());

        let response: GetProviderResponse = match self.client(declared).get(&path).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                debug!("{} {} no longer exists", F::KIND, declared.id());
                return Ok(ReadOutcome::NotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let idp = response.idp;
        let Some(block) = idp.config.get(F::CONFIG_KEY) else {
            return Err(ApiError::invalid_response(format!(
                "identity provider {} is not a {}",
                idp.id,
                F::KIND
            ))
            .into());
        };

        let options: ProviderOptions = match idp.config.get("options") {
            Some(options) => decode_block(options, "provider options")?,
            None => ProviderOptions::default(),
        };
        let client: ProviderClientConfig = decode_block(block, F::CONFIG_KEY)?;
        let settings: F::Settings = decode_block(block, F::CONFIG_KEY)?;

        let mut state = declared.clone().with_id(idp.id);
        Self::record_owner(&mut state, idp.details.resource_owner);
        state.set(NAME, idp.name);
        state.set(CLIENT_ID, client.client_id);
        state.set(SCOPES, AttrValue::set(client.scopes));
        state.set(IS_LINKING_ALLOWED, options.is_linking_allowed);
        state.set(IS_CREATION_ALLOWED, options.is_creation_allowed);
        state.set(IS_AUTO_CREATION, options.is_auto_creation);
        state.set(IS_AUTO_UPDATE, options.is_auto_update);
        F::settings_into_state(settings, &mut state);

        Ok(ReadOutcome::Found(state))
    }

    async fn update(&self, prior: &DeclaredState, planned: &DeclaredState) -> Result<DeclaredState> {
        if !has_changes(F::KIND, prior, planned) {
            return Ok(planned.clone());
        }

        let request = IdpSpec::<F::Settings>::from_state::<F>(planned)?.into_request();
        let path = format!("{}/idps/{}/{}", Self::root(), F::PATH, planned.id());

        let _: DetailsResponse = self.client(planned).put(&path, &request).await?;
        info!("Updated {} {}", F::KIND, planned.id());
        Ok(planned.clone())
    }

    async fn delete(&self, declared: &DeclaredState) -> Result<()> {
        let path = format!("{}/idps/{}", Self::root(), declared.id());

        absent_ok(self.client(declared).delete(&path).await)?;
        info!("Deleted {} {}", F::KIND, declared.id());
        Ok(())
    }
}
