//! Typed wrapper over the backend REST endpoints the pages use.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::{HttpClient, Payload, RequestError, RequestOptions};
use crate::session::User;

/// Stored when the backend logs a user in without issuing a token.
pub const FALLBACK_TOKEN: &str = "temp-token";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub codigo_acesso: String,
    pub senha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub user: User,
}

impl LoginResponse {
    pub fn session_token(&self) -> &str {
        self.token
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(FALLBACK_TOKEN)
    }
}

/// Period the dashboard metrics cover unless the caller picks another one.
pub const DEFAULT_METRICS_DAYS: u32 = 30;
/// Rows shown in the dashboard's recent clients and recent sales tables.
pub const DEFAULT_RECENT_LIMIT: u32 = 10;

/// One page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 0, size: 20 }
    }
}

impl PageRequest {
    fn query(&self) -> String {
        format!("page={}&size={}", self.page, self.size)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VendaFilter {
    pub cliente_nome: Option<String>,
    pub status: Option<String>,
    pub data_inicio: Option<String>,
    pub data_fim: Option<String>,
}

#[derive(Clone)]
pub struct ApiService {
    client: HttpClient,
    base_url: String,
}

impl ApiService {
    pub fn new(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    pub async fn health(&self) -> bool {
        let options = RequestOptions::get().no_cache().retry(false).quiet();
        match self.client.request(&self.url("/health"), options).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Backend unavailable");
                false
            }
        }
    }

    pub async fn login(&self, codigo_acesso: &str, senha: &str) -> Result<LoginResponse, RequestError> {
        let body = LoginRequest {
            codigo_acesso: codigo_acesso.to_string(),
            senha: senha.to_string(),
        };
        let body = serde_json::to_value(body).map_err(|e| RequestError::Decode(e.to_string()))?;
        self.client
            .post(&self.url("/users/login"), body)
            .await?
            .deserialize()
    }

    pub async fn clientes(&self, page: PageRequest, search: Option<&str>) -> Result<Value, RequestError> {
        let mut url = self.url(&format!("/clientes?{}", page.query()));
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            url.push_str(&format!("&search={}", urlencoding::encode(search)));
        }
        self.get_json(&url).await
    }

    pub async fn search_clientes(&self, term: &str, page: PageRequest) -> Result<Value, RequestError> {
        let url = self.url(&format!(
            "/clientes/search?searchText={}&{}",
            urlencoding::encode(term),
            page.query()
        ));
        self.get_json(&url).await
    }

    pub async fn cliente(&self, id: i64) -> Result<Value, RequestError> {
        self.get_json(&self.url(&format!("/clientes/{id}"))).await
    }

    pub async fn create_cliente(&self, data: Value) -> Result<Value, RequestError> {
        self.write(self.client.post(&self.url("/clientes"), data).await)
    }

    pub async fn update_cliente(&self, id: i64, data: Value) -> Result<Value, RequestError> {
        self.write(self.client.put(&self.url(&format!("/clientes/{id}")), data).await)
    }

    pub async fn delete_cliente(&self, id: i64) -> Result<Value, RequestError> {
        self.write(self.client.delete(&self.url(&format!("/clientes/{id}"))).await)
    }

    pub async fn vendas(&self, page: PageRequest, filter: &VendaFilter) -> Result<Value, RequestError> {
        let mut url = self.url(&format!("/vendas?{}", page.query()));
        let params = [
            ("clienteNome", &filter.cliente_nome),
            ("status", &filter.status),
            ("dataInicio", &filter.data_inicio),
            ("dataFim", &filter.data_fim),
        ];
        for (name, value) in params {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                url.push_str(&format!("&{name}={}", urlencoding::encode(value)));
            }
        }
        self.get_json(&url).await
    }

    pub async fn venda(&self, id: i64) -> Result<Value, RequestError> {
        self.get_json(&self.url(&format!("/vendas/{id}"))).await
    }

    pub async fn create_venda(&self, data: Value) -> Result<Value, RequestError> {
        self.write(self.client.post(&self.url("/vendas"), data).await)
    }

    pub async fn update_venda(&self, id: i64, data: Value) -> Result<Value, RequestError> {
        self.write(self.client.put(&self.url(&format!("/vendas/{id}")), data).await)
    }

    pub async fn delete_venda(&self, id: i64) -> Result<Value, RequestError> {
        self.write(self.client.delete(&self.url(&format!("/vendas/{id}"))).await)
    }

    pub async fn users(&self, page: PageRequest) -> Result<Value, RequestError> {
        self.get_json(&self.url(&format!("/users?{}", page.query()))).await
    }

    pub async fn user(&self, id: i64) -> Result<Value, RequestError> {
        self.get_json(&self.url(&format!("/users/{id}"))).await
    }

    pub async fn roles(&self) -> Result<Value, RequestError> {
        self.get_json(&self.url("/users/roles")).await
    }

    pub async fn dashboard_metrics(&self, days: u32) -> Result<Value, RequestError> {
        self.get_json(&self.url(&format!("/dashboard/metrics?days={days}")))
            .await
    }

    pub async fn recent_clientes(&self, limit: u32) -> Result<Vec<Value>, RequestError> {
        let body = self
            .get_json(&self.url(&format!("/dashboard/recent-clients?limit={limit}")))
            .await?;
        Ok(list_field(&body, "clients"))
    }

    pub async fn recent_vendas(&self, limit: u32) -> Result<Vec<Value>, RequestError> {
        let body = self
            .get_json(&self.url(&format!("/dashboard/recent-sales?limit={limit}")))
            .await?;
        Ok(list_field(&body, "sales"))
    }

    async fn get_json(&self, url: &str) -> Result<Value, RequestError> {
        Ok(self.client.get(url).await?.into_json())
    }

    /// Writes change what listings return, so cached reads are dropped.
    fn write(&self, result: Result<Payload, RequestError>) -> Result<Value, RequestError> {
        let payload = result?;
        self.client.clear_cache();
        Ok(payload.into_json())
    }
}

/// The list under `field`, either at the top level or inside a `data` wrapper.
fn list_field(body: &Value, field: &str) -> Vec<Value> {
    body.get("data")
        .unwrap_or(body)
        .get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
