use std::future::Future;
use std::sync::Arc;

use clap::Parser;
use miette::Result;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

use maiconsoft::access::{loader, AccessPolicy, Route};
use maiconsoft::api::{
    ApiService, PageRequest, VendaFilter, DEFAULT_METRICS_DAYS, DEFAULT_RECENT_LIMIT,
};
use maiconsoft::console::{Command, MemoryHistory, TerminalHost, HELP};
use maiconsoft::errors::AppError;
use maiconsoft::http::{HttpClient, RequestCache, RequestError};
use maiconsoft::router::{NoticeLevel, Notifier, Router};
use maiconsoft::session::{FileStore, SessionAuth, SessionStore};
use maiconsoft::settings::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "maiconsoft",
    version,
    about = "Maiconsoft management frontend, driven from the terminal"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Initial route fragment, e.g. #vendas
    #[arg(short, long)]
    route: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let policy = match &settings.access.policy_path {
        Some(path) => loader::load_policy(path)?,
        None => AccessPolicy::builtin(),
    };

    let store: Arc<dyn SessionStore> =
        Arc::new(FileStore::open(&settings.session.path).map_err(AppError::from)?);
    let auth = SessionAuth::new(Arc::clone(&store));

    let host = Arc::new(TerminalHost::new());
    let cache = Arc::new(
        RequestCache::new(settings.cache.ttl()).with_capacity(settings.cache.capacity),
    );
    let client = HttpClient::new(cache)
        .with_policy(settings.request.retry_policy())
        .with_timeout(settings.request.timeout())
        .with_session(Arc::clone(&store))
        .with_loading(host.clone());
    let api = ApiService::new(client, settings.api.base_url.clone());

    if !api.health().await {
        host.notify(NoticeLevel::Error, "Backend indisponível");
    }

    let history = Arc::new(MemoryHistory::new(cli.route.clone()));
    let mut router = Router::new(
        Arc::new(policy),
        Arc::new(auth.clone()),
        host.clone(),
        host.clone(),
        history,
    )
    .with_unknown_route(settings.router.unknown_route);
    register_page_loaders(&mut router, &api);

    router.start()?;
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.map_err(AppError::from)? {
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        match command {
            Command::Quit => break,
            Command::Help => println!("{HELP}"),
            Command::Navigate(target) => {
                if let Err(e) = router.navigate(&target, true) {
                    host.notify(NoticeLevel::Error, &e.to_string());
                }
            }
            Command::Back => {
                if let Err(e) = router.back() {
                    host.notify(NoticeLevel::Error, &e.to_string());
                }
            }
            Command::Login { code, password } => match api.login(&code, &password).await {
                Ok(response) => {
                    auth.login(response.session_token(), &response.user)
                        .map_err(AppError::from)?;
                    host.notify(
                        NoticeLevel::Info,
                        response.message.as_deref().unwrap_or("Login realizado com sucesso"),
                    );
                    let landing = router.default_route();
                    router.navigate_to(landing, true);
                }
                Err(e) => {
                    host.notify(NoticeLevel::Error, &format!("Falha no login: {e}"));
                }
            },
            Command::Logout => {
                router.logout();
            }
            Command::Check(permission) => {
                if router.guard(&permission, || ()).is_ok() {
                    host.notify(NoticeLevel::Info, &format!("Permitido: {permission}"));
                }
            }
            Command::ClearCache => {
                api.client().clear_cache();
                host.notify(NoticeLevel::Info, "Cache limpo");
            }
        }
    }

    Ok(())
}

/// Each page fetches its data in the background when it becomes visible.
fn register_page_loaders(router: &mut Router, api: &ApiService) {
    let a = api.clone();
    router.on_load(
        Route::Dashboard,
        spawn_fetch("dashboard", move || {
            let api = a.clone();
            async move {
                let (metrics, clients, sales) = tokio::try_join!(
                    api.dashboard_metrics(DEFAULT_METRICS_DAYS),
                    api.recent_clientes(DEFAULT_RECENT_LIMIT),
                    api.recent_vendas(DEFAULT_RECENT_LIMIT),
                )?;
                Ok::<_, RequestError>(json!({"metrics": metrics, "clients": clients, "sales": sales}))
            }
        }),
    );

    let a = api.clone();
    router.on_load(
        Route::Cliente,
        spawn_fetch("clientes", move || {
            let api = a.clone();
            async move { api.clientes(PageRequest::default(), None).await }
        }),
    );

    let a = api.clone();
    router.on_load(
        Route::Vendas,
        spawn_fetch("vendas", move || {
            let api = a.clone();
            async move { api.vendas(PageRequest::default(), &VendaFilter::default()).await }
        }),
    );

    let a = api.clone();
    router.on_load(
        Route::Usuarios,
        spawn_fetch("usuarios", move || {
            let api = a.clone();
            async move { api.users(PageRequest::default()).await }
        }),
    );

    let a = api.clone();
    router.on_load(
        Route::Relatorios,
        spawn_fetch("relatorios", move || {
            let api = a.clone();
            async move { api.vendas(PageRequest::default(), &VendaFilter::default()).await }
        }),
    );
}

fn spawn_fetch<F, Fut>(page: &'static str, fetch: F) -> impl FnMut() + Send + 'static
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = std::result::Result<Value, RequestError>> + Send + 'static,
{
    move || {
        let request = fetch();
        tokio::spawn(async move {
            match request.await {
                Ok(data) => {
                    let items = data
                        .get("content")
                        .and_then(Value::as_array)
                        .or_else(|| data.as_array())
                        .map(Vec::len);
                    tracing::info!(page, ?items, "Page data loaded");
                }
                // Already logged by the client; the page keeps its last state.
                Err(e) => println!("[erro] Falha ao carregar {page}: {e}"),
            }
        });
    }
}
