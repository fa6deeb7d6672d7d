use crate::gateway::GatewayChain;
use crate::pipeline::HtmlTranslator;
use crate::settings;

#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) settings: settings::Settings,
    pub(crate) client: reqwest::Client,
    /// Overrides provider keys from the environment, including for
    /// per-request model chains.
    pub(crate) key: Option<String>,
    /// `None` when no configured model had a usable key at startup.
    pub(crate) translator: Option<HtmlTranslator<GatewayChain>>,
}

impl ServerState {
    pub(crate) fn gateway_names(&self) -> Vec<String> {
        self.translator
            .as_ref()
            .map(|translator| translator.gateway().gateway_names())
            .unwrap_or_default()
    }
}
