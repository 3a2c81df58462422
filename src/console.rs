//! Terminal stand-ins for the page host: sections, notices, history and the
//! loading flag are rendered as log lines and short stdout messages.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::access::Route;
use crate::http::LoadingIndicator;
use crate::router::{HistoryHost, NoticeLevel, Notifier, SectionHost};

#[derive(Debug, Default)]
pub struct TerminalHost {
    visible: Mutex<Option<Route>>,
    loading: AtomicUsize,
}

impl TerminalHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(&self) -> Option<Route> {
        *self.visible.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }
}

impl SectionHost for TerminalHost {
    fn hide_all(&self) {
        *self.visible.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn show(&self, route: Route) -> bool {
        *self.visible.lock().unwrap_or_else(PoisonError::into_inner) = Some(route);
        tracing::debug!(section = route.section_id(), "Section shown");
        true
    }

    fn highlight(&self, route: Route) {
        tracing::debug!(route = %route, "Navigation highlight");
    }

    fn set_title(&self, title: &str) {
        println!("== {title} ==");
    }

    fn set_breadcrumbs(&self, trail: &[String]) {
        println!("   {}", trail.join(" > "));
    }
}

impl Notifier for TerminalHost {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => println!("[info] {message}"),
            NoticeLevel::Error => println!("[erro] {message}"),
        }
    }
}

/// Nested requests share one indicator; it is hidden when the last one ends.
impl LoadingIndicator for TerminalHost {
    fn show(&self) {
        if self.loading.fetch_add(1, Ordering::SeqCst) == 0 {
            tracing::debug!("Loading started");
        }
    }

    fn hide(&self) {
        let previous = self
            .loading
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous == 1 {
            tracing::debug!("Loading finished");
        }
    }
}

/// In-process fragment history.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    entries: Mutex<Vec<String>>,
}

impl MemoryHistory {
    /// `initial` plays the role of the fragment present at page load.
    pub fn new(initial: Option<String>) -> Self {
        Self {
            entries: Mutex::new(initial.into_iter().collect()),
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HistoryHost for MemoryHistory {
    fn push(&self, route: Route) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(format!("#{route}"));
    }

    fn current_fragment(&self) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    fn back(&self) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.pop();
        entries.last().cloned()
    }
}

/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Navigate(String),
    Back,
    Login { code: String, password: String },
    Logout,
    /// Run a permission-gated action.
    Check(String),
    ClearCache,
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> Option<Command> {
        let mut words = line.split_whitespace();
        let head = words.next()?;
        let command = match head {
            "back" => Command::Back,
            "logout" => Command::Logout,
            "clear-cache" => Command::ClearCache,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "login" => {
                let code = words.next()?.to_string();
                let password = words.next()?.to_string();
                Command::Login { code, password }
            }
            "check" => Command::Check(words.next()?.to_string()),
            target => Command::Navigate(target.to_string()),
        };
        Some(command)
    }
}

pub const HELP: &str = "\
comandos:
  <rota> | #<rota>          navegar (login, dashboard, cliente, vendas, usuarios, relatorios)
  back                      voltar no histórico
  login <código> <senha>    entrar
  logout                    sair
  check <modulo:acao>       testar uma permissão
  clear-cache               limpar o cache de respostas
  quit                      encerrar";
