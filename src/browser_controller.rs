use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use headless_chrome::{
    browser::default_executable, protocol::cdp::Page, Browser, LaunchOptions, Tab,
};
use serde::de::DeserializeOwned;
use sysinfo::{Pid, PidExt, ProcessExt, System, SystemExt};

use crate::surface::{ElementRef, Locator, Scope, Surface, SurfaceError};

const FRAMES: &str = "document.querySelectorAll('iframe, frame')";
/// Rendered text per node; hidden nodes read as empty so indices still line up.
const VISIBLE_TEXTS: &str =
    "nodes.map(n => (n.offsetParent !== null ? (n.innerText || '') : '').trim())";

#[derive(Builder, Debug, Clone)]
#[builder(setter(into))]
pub struct BrowserOptions {
    // chrome binary, detected when not set
    #[builder(default = "None")]
    path: Option<PathBuf>,
    // user data directory holding the signed-in session
    #[builder(default = "None")]
    profile_dir: Option<PathBuf>,
    #[builder(default = "false")]
    headless: bool,
    // browser idle timeout
    #[builder(default = "Duration::from_secs(600)")]
    timeout: Duration,
    // where the browser writes downloads
    download_dir: PathBuf,
    #[builder(default = "(1920, 1080)")]
    window_size: (u32, u32),
}

impl BrowserOptions {
    pub fn default_builder() -> BrowserOptionsBuilder {
        BrowserOptionsBuilder::default()
    }
}

/// One Chrome instance with a single tab, driven as a `Surface`.
pub struct BrowserController {
    browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserController {
    pub fn new(options: &BrowserOptions) -> Result<Self> {
        let is_docker = std::env::var("IN_DOCKER").is_ok();
        let path = match &options.path {
            Some(p) => p.clone(),
            None => default_executable().map_err(|e| anyhow!("no chrome binary found: {}", e))?,
        };
        let download_dir = options
            .download_dir
            .canonicalize()
            .context(format!("download directory {:?}", options.download_dir))?;

        let launch = LaunchOptions::default_builder()
            .path(Some(path))
            .headless(options.headless)
            .window_size(Some(options.window_size))
            .idle_browser_timeout(options.timeout)
            .user_data_dir(options.profile_dir.clone())
            // warning only do this if in docker env
            .sandbox(!is_docker)
            .build()
            .map_err(|e| anyhow!("invalid launch options: {}", e))?;
        let browser = Browser::new(launch).context("browser launching error")?;
        let tab = browser.new_tab().context("could not create new tab")?;
        tab.set_default_timeout(options.timeout);

        tab.call_method(Page::SetDownloadBehavior {
            behavior: Page::SetDownloadBehaviorBehaviorOption::Allow,
            download_path: Some(download_dir.to_string_lossy().into_owned()),
        })
        .context("could not set download behavior")?;
        debug!("browser downloads go to {:?}", download_dir);

        Ok(BrowserController { browser, tab })
    }

    fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T, SurfaceError> {
        let result = self.tab.evaluate(script, false).map_err(driver)?;
        let value = result
            .value
            .ok_or_else(|| SurfaceError::Driver("script returned no value".into()))?;
        let parsed = match value {
            serde_json::Value::String(s) => serde_json::from_str(&s),
            other => serde_json::from_value(other),
        };
        parsed.map_err(|e| SurfaceError::Driver(format!("unexpected script result: {}", e)))
    }

    /// Evaluates `body` with `nodes` bound to the matches of `locator` in `scope`.
    fn on_nodes<T: DeserializeOwned>(
        &self,
        scope: Scope,
        locator: &Locator,
        body: &str,
    ) -> Result<T, SurfaceError> {
        let xpath = serde_json::to_string(locator.as_str())
            .map_err(|e| SurfaceError::Driver(e.to_string()))?;
        let script = format!(
            r#"(function() {{
                const doc = {doc};
                if (!doc) {{ return JSON.stringify(null); }}
                const found = doc.evaluate({xpath}, doc, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
                const nodes = [];
                for (let i = 0; i < found.snapshotLength; i++) {{ nodes.push(found.snapshotItem(i)); }}
                return JSON.stringify({body});
            }})()"#,
            doc = document_of(scope),
            xpath = xpath,
            body = body,
        );
        let value: Option<T> = self.eval(&script)?;
        value.ok_or(SurfaceError::Unreachable(scope))
    }

    fn on_element(&self, element: &ElementRef, action: &str) -> Result<(), SurfaceError> {
        let body = format!(
            "(function(n) {{ if (!n) {{ return false; }} {} return true; }})(nodes[{}])",
            action, element.index
        );
        let done: bool = self.on_nodes(element.scope, &element.locator, &body)?;
        if done {
            Ok(())
        } else {
            Err(SurfaceError::NotFound(element.locator.clone()))
        }
    }

    pub fn kill(&self) -> bool {
        let pid = match self.browser.get_process_id() {
            Some(pid) => pid,
            None => return false,
        };
        let mut s = System::new();
        s.refresh_processes();
        if let Some(process) = s.process(Pid::from_u32(pid)) {
            debug!("killing process with id {}", pid);
            process.kill();
            return true;
        }
        false
    }
}

fn driver(e: anyhow::Error) -> SurfaceError {
    SurfaceError::Driver(format!("{:#}", e))
}

/// Script expression for the document of `scope`, `null` when unreachable.
fn document_of(scope: Scope) -> String {
    match scope {
        Scope::Top => "document".into(),
        Scope::Embedded(i) => format!(
            "(function() {{ try {{ const f = {}[{}]; return f ? f.contentDocument : null; }} catch (e) {{ return null; }} }})()",
            FRAMES, i
        ),
    }
}

impl Surface for BrowserController {
    fn load(&self, url: &str) -> Result<(), SurfaceError> {
        debug!("navigating to {}", url);
        self.tab
            .navigate_to(url)
            .and_then(|t| t.wait_until_navigated())
            .map_err(driver)?;
        // reports render inside an iframe that shows up after the base document
        if let Err(e) = self
            .tab
            .wait_for_element_with_custom_timeout("iframe", Duration::from_secs(30))
        {
            debug!("no embedded document on {} yet: {}", url, e);
        }
        Ok(())
    }

    fn reload(&self) -> Result<(), SurfaceError> {
        debug!("reloading {}", self.tab.get_url());
        self.tab
            .reload(false, None)
            .and_then(|t| t.wait_until_navigated())
            .map_err(driver)?;
        Ok(())
    }

    fn embedded_count(&self) -> Result<usize, SurfaceError> {
        self.eval(&format!("JSON.stringify({}.length)", FRAMES))
    }

    fn count(&self, scope: Scope, locator: &Locator) -> Result<usize, SurfaceError> {
        self.on_nodes(scope, locator, "nodes.length")
    }

    fn texts(&self, scope: Scope, locator: &Locator) -> Result<Vec<String>, SurfaceError> {
        self.on_nodes(scope, locator, VISIBLE_TEXTS)
    }

    fn scroll_into_view(&self, element: &ElementRef) -> Result<(), SurfaceError> {
        self.on_element(element, "n.scrollIntoView({block: 'center', inline: 'center'});")
    }

    fn native_click(&self, element: &ElementRef) -> Result<(), SurfaceError> {
        if element.scope != Scope::Top {
            return Err(SurfaceError::Unsupported(
                "native click inside an embedded document",
            ));
        }
        let elements = self
            .tab
            .find_elements_by_xpath(element.locator.as_str())
            .map_err(driver)?;
        let target = elements
            .get(element.index)
            .ok_or_else(|| SurfaceError::NotFound(element.locator.clone()))?;
        target.click().map_err(driver)?;
        Ok(())
    }

    fn synthetic_click(&self, element: &ElementRef) -> Result<(), SurfaceError> {
        self.on_element(
            element,
            "n.dispatchEvent(new MouseEvent('click', {bubbles: true, cancelable: true, view: window}));",
        )
    }
}

impl Drop for BrowserController {
    fn drop(&mut self) {
        debug!("killing browser process...");
        self.kill();
    }
}
