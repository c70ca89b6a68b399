//! Builds the concrete [`ModelProvider`] for a given variant. Cheap: no
//! shared mutable state is created here, so each worker can call the
//! factory itself rather than share a provider instance across threads.

use crate::{local_http::LocalHttpProvider, remote_api::OpenAiProvider, ModelProvider, ProviderParams};

#[derive(Debug, Clone)]
pub enum ProviderVariant {
    RemoteApi { api_key: String },
    LocalOpenAiCompatible { base_url: String },
    LocalHttp { base_url: String },
}

pub struct ProviderFactory;

impl ProviderFactory {
    pub fn build(variant: &ProviderVariant, params: ProviderParams) -> Box<dyn ModelProvider> {
        match variant {
            ProviderVariant::RemoteApi { api_key } => {
                Box::new(OpenAiProvider::new(api_key, "https://api.openai.com/v1", params))
            }
            ProviderVariant::LocalOpenAiCompatible { base_url } => {
                Box::new(OpenAiProvider::new("not-needed", base_url, params))
            }
            ProviderVariant::LocalHttp { base_url } => {
                Box::new(LocalHttpProvider::new(base_url.clone(), params))
            }
        }
    }
}
