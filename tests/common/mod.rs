#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::anyhow;
use report_courier::{
    clock::ManualClock,
    exporter::{ANY_BUTTON, CONFIRM_BUTTONS, PDF_FORMAT_BUTTON},
    mailer::{MailMessage, Mailer},
    navigator::{
        DIRECT_EXPORT_BUTTON, FILE_EXPORT_ITEM, FILE_MENU_BUTTON, FILE_PDF_ITEM, OVERFLOW_BUTTON,
        OVERFLOW_PDF_ITEM,
    },
    pages::DocumentTool,
    readiness::BUSY_LOCATOR,
    runner::RunnerOptions,
    surface::{ElementRef, Locator, Scope, Surface, SurfaceError},
};

/// How a scripted report lets itself be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Overflow,
    File,
    Nowhere,
}

impl Route {
    fn chain(&self) -> Vec<&'static str> {
        match self {
            Route::Direct => vec![DIRECT_EXPORT_BUTTON, PDF_FORMAT_BUTTON],
            Route::Overflow => vec![OVERFLOW_BUTTON, OVERFLOW_PDF_ITEM],
            Route::File => vec![FILE_MENU_BUTTON, FILE_EXPORT_ITEM, FILE_PDF_ITEM],
            Route::Nowhere => vec![],
        }
    }
}

/// A scripted report page.
#[derive(Debug, Clone)]
pub struct Page {
    pub title: String,
    pub route: Route,
    /// where the menu lives
    pub scope: Scope,
    /// the loading indicator stays up this long after every (re)load
    pub busy_for: Duration,
    /// the dialog only has an unlabelled-id button reading "Exportar"
    pub text_confirm_only: bool,
    /// one line per page
    pub pages: Vec<String>,
    /// delay between the partial download and its rename
    pub download_delay: Duration,
    /// an extra cross-origin frame that cannot be read
    pub sandboxed_frame: bool,
}

impl Page {
    pub fn new(title: &str, route: Route) -> Self {
        Page {
            title: title.into(),
            route,
            scope: Scope::Top,
            busy_for: Duration::ZERO,
            text_confirm_only: false,
            pages: (1..=2).map(|i| format!("{} p{}", title, i)).collect(),
            download_delay: Duration::from_secs(2),
            sandboxed_frame: false,
        }
    }

    pub fn with_sandboxed_frame(mut self) -> Self {
        self.sandboxed_frame = true;
        self
    }

    pub fn in_frame(mut self) -> Self {
        self.scope = Scope::Embedded(0);
        self
    }

    pub fn busy_for(mut self, d: Duration) -> Self {
        self.busy_for = d;
        self
    }

    pub fn with_pages(mut self, n: usize) -> Self {
        self.pages = (1..=n).map(|i| format!("{} p{}", self.title, i)).collect();
        self
    }

    pub fn text_confirm_only(mut self) -> Self {
        self.text_confirm_only = true;
        self
    }
}

#[derive(Default)]
struct State {
    current: Option<String>,
    loaded_at: Duration,
    // how far along the menu chain the current page is
    progress: usize,
    dialog_open: bool,
    loads: Vec<String>,
    reloads: usize,
    clicks: Vec<(Scope, String, &'static str)>,
}

/// A dashboard whose pages follow a script, on virtual time.
pub struct FakeSurface {
    clock: Rc<ManualClock>,
    download_dir: PathBuf,
    pages: HashMap<String, Page>,
    state: RefCell<State>,
}

impl FakeSurface {
    pub fn new(clock: Rc<ManualClock>, download_dir: &Path) -> Self {
        FakeSurface {
            clock,
            download_dir: download_dir.to_path_buf(),
            pages: HashMap::new(),
            state: RefCell::new(State::default()),
        }
    }

    pub fn page(mut self, url: &str, page: Page) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    pub fn loads(&self) -> Vec<String> {
        self.state.borrow().loads.clone()
    }

    pub fn reloads(&self) -> usize {
        self.state.borrow().reloads
    }

    pub fn clicks(&self) -> Vec<(Scope, String, &'static str)> {
        self.state.borrow().clicks.clone()
    }

    fn current(&self) -> Option<&Page> {
        let state = self.state.borrow();
        state.current.as_ref().and_then(|url| self.pages.get(url))
    }

    fn busy(&self, page: &Page) -> bool {
        self.clock.elapsed() < self.state.borrow().loaded_at + page.busy_for
    }

    fn present(&self, scope: Scope, locator: &str) -> usize {
        let page = match self.current() {
            Some(p) => p,
            None => return 0,
        };
        if locator == BUSY_LOCATOR.as_str() {
            return (scope == Scope::Embedded(0) && self.busy(page)) as usize;
        }
        let state = self.state.borrow();
        if state.dialog_open && scope == Scope::Top {
            if page.text_confirm_only {
                return (locator == ANY_BUTTON) as usize * 2;
            }
            return (locator == CONFIRM_BUTTONS[0]) as usize;
        }
        if self.busy(page) || scope != page.scope {
            return 0;
        }
        page.route
            .chain()
            .iter()
            .take(state.progress + 1)
            .any(|l| *l == locator) as usize
    }

    fn on_click(&self, element: &ElementRef, kind: &'static str) -> Result<(), SurfaceError> {
        if self.present(element.scope, element.locator.as_str()) <= element.index {
            return Err(SurfaceError::NotFound(element.locator.clone()));
        }
        let page = self
            .current()
            .cloned()
            .ok_or_else(|| SurfaceError::Driver("nothing loaded".into()))?;
        let mut state = self.state.borrow_mut();
        state
            .clicks
            .push((element.scope, element.locator.to_string(), kind));

        if state.dialog_open {
            state.dialog_open = false;
            drop(state);
            self.start_download(&page);
            return Ok(());
        }
        let chain = page.route.chain();
        if let Some(pos) = chain.iter().position(|l| *l == element.locator.as_str()) {
            state.progress = state.progress.max(pos + 1);
            if state.progress == chain.len() {
                state.dialog_open = true;
            }
        }
        Ok(())
    }

    fn start_download(&self, page: &Page) {
        let partial = self
            .download_dir
            .join(format!("{}.pdf.crdownload", page.title));
        let done = self.download_dir.join(format!("{}.pdf", page.title));
        fs::write(&partial, page.pages.join("\n")).unwrap();
        self.clock
            .at(self.clock.elapsed() + page.download_delay, move || {
                fs::rename(&partial, &done).unwrap();
            });
    }

    fn reset(&self, state: &mut State) {
        state.loaded_at = self.clock.elapsed();
        state.progress = 0;
        state.dialog_open = false;
    }
}

impl Surface for FakeSurface {
    fn load(&self, url: &str) -> Result<(), SurfaceError> {
        let mut state = self.state.borrow_mut();
        state.loads.push(url.into());
        if !self.pages.contains_key(url) {
            return Err(SurfaceError::Driver(format!("no page at {}", url)));
        }
        state.current = Some(url.into());
        self.reset(&mut state);
        Ok(())
    }

    fn reload(&self) -> Result<(), SurfaceError> {
        let mut state = self.state.borrow_mut();
        state.reloads += 1;
        self.reset(&mut state);
        Ok(())
    }

    fn embedded_count(&self) -> Result<usize, SurfaceError> {
        let sandboxed = self.current().map(|p| p.sandboxed_frame).unwrap_or(false);
        Ok(1 + sandboxed as usize)
    }

    fn count(&self, scope: Scope, locator: &Locator) -> Result<usize, SurfaceError> {
        if scope == Scope::Embedded(1) {
            return Err(SurfaceError::Unreachable(scope));
        }
        Ok(self.present(scope, locator.as_str()))
    }

    fn texts(&self, scope: Scope, locator: &Locator) -> Result<Vec<String>, SurfaceError> {
        let n = self.present(scope, locator.as_str());
        Ok(["Cancelar", "Exportar"]
            .iter()
            .take(n)
            .map(|s| s.to_string())
            .collect())
    }

    fn scroll_into_view(&self, _element: &ElementRef) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn native_click(&self, element: &ElementRef) -> Result<(), SurfaceError> {
        if element.scope != Scope::Top {
            return Err(SurfaceError::Unsupported("native click in a frame"));
        }
        self.on_click(element, "native")
    }

    fn synthetic_click(&self, element: &ElementRef) -> Result<(), SurfaceError> {
        self.on_click(element, "synthetic")
    }
}

/// Text files standing in for PDFs, one page per line.
#[derive(Default, Clone)]
pub struct FakeDocuments {
    pub merges: Arc<Mutex<Vec<(Vec<PathBuf>, PathBuf)>>>,
}

fn lines(path: &Path) -> anyhow::Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(String::from)
        .collect())
}

impl DocumentTool for FakeDocuments {
    fn page_count(&self, path: &Path) -> anyhow::Result<u32> {
        Ok(lines(path)?.len() as u32)
    }

    fn select_pages(&self, src: &Path, dst: &Path, pages: &[u32]) -> anyhow::Result<()> {
        let all = lines(src)?;
        let picked = pages
            .iter()
            .map(|p| {
                all.get(*p as usize - 1)
                    .cloned()
                    .ok_or_else(|| anyhow!("no page {}", p))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        fs::write(dst, picked.join("\n"))?;
        Ok(())
    }

    fn merge(&self, inputs: &[PathBuf], output: &Path) -> anyhow::Result<()> {
        let mut all = vec![];
        for input in inputs {
            all.extend(lines(input)?);
        }
        fs::write(output, all.join("\n"))?;
        self.merges
            .lock()
            .unwrap()
            .push((inputs.to_vec(), output.to_path_buf()));
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct RecordingMailer {
    pub sent: Arc<Mutex<Vec<MailMessage>>>,
    pub fail: bool,
}

impl Mailer for RecordingMailer {
    fn send(&self, message: &MailMessage) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow!("smtp relay refused the message"));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Short windows so failing paths finish quickly in virtual time.
pub fn quick_options() -> RunnerOptions {
    RunnerOptions::default_builder()
        .element_timeout(Duration::from_secs(2))
        .confirm_timeout(Duration::from_secs(1))
        .download_timeout(Duration::from_secs(60))
        .build()
        .unwrap()
}
