use std::{fmt, time::Duration};

use itertools::Itertools;
use thiserror::Error;

use crate::clock::Clock;

/// Which document of the surface an element lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Top,
    /// n-th embedded sub-document (iframe) of the top-level document
    Embedded(usize),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Top => write!(f, "top"),
            Scope::Embedded(i) => write!(f, "frame#{}", i),
        }
    }
}

/// An XPath expression identifying one or more elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(String);

impl Locator {
    pub fn xpath(expression: &str) -> Self {
        Locator(expression.to_string())
    }

    /// Union of several expressions, matching whatever any of them matches.
    pub fn any_of(expressions: &[&str]) -> Self {
        Locator(expressions.iter().join(" | "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The `index`-th element matched by `locator` inside `scope`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRef {
    pub scope: Scope,
    pub locator: Locator,
    pub index: usize,
}

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("element not found: {0}")]
    NotFound(Locator),
    #[error("{0} is not reachable")]
    Unreachable(Scope),
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    #[error("driver: {0}")]
    Driver(String),
}

/// A live, automatable page.
pub trait Surface {
    /// Navigates to `url` and waits for the base document to be loaded.
    fn load(&self, url: &str) -> Result<(), SurfaceError>;
    fn reload(&self) -> Result<(), SurfaceError>;
    fn embedded_count(&self) -> Result<usize, SurfaceError>;
    fn count(&self, scope: Scope, locator: &Locator) -> Result<usize, SurfaceError>;
    fn texts(&self, scope: Scope, locator: &Locator) -> Result<Vec<String>, SurfaceError>;
    fn scroll_into_view(&self, element: &ElementRef) -> Result<(), SurfaceError>;
    /// Input-level click at the element's position.
    fn native_click(&self, element: &ElementRef) -> Result<(), SurfaceError>;
    /// Click event dispatched from script on the element itself.
    fn synthetic_click(&self, element: &ElementRef) -> Result<(), SurfaceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchState {
    SearchingTop,
    SearchingEmbedded(usize),
    Found(Scope),
    Exhausted,
}

/// One sweep over the top-level document and its embedded sub-documents.
pub struct SubDocumentSearch<'a> {
    surface: &'a dyn Surface,
    locator: &'a Locator,
    state: SearchState,
    embedded: usize,
}

impl<'a> SubDocumentSearch<'a> {
    pub fn new(surface: &'a dyn Surface, locator: &'a Locator) -> Self {
        SubDocumentSearch {
            surface,
            locator,
            state: SearchState::SearchingTop,
            embedded: 0,
        }
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    pub fn step(&mut self) -> SearchState {
        self.state = match self.state {
            SearchState::SearchingTop => {
                if self.present(Scope::Top) {
                    SearchState::Found(Scope::Top)
                } else {
                    self.embedded = match self.surface.embedded_count() {
                        Ok(n) => n,
                        Err(e) => {
                            trace!("could not list embedded documents: {}", e);
                            0
                        }
                    };
                    self.next_embedded(0)
                }
            }
            SearchState::SearchingEmbedded(i) => {
                if self.present(Scope::Embedded(i)) {
                    SearchState::Found(Scope::Embedded(i))
                } else {
                    self.next_embedded(i + 1)
                }
            }
            done => done,
        };
        self.state
    }

    /// Steps until the sweep either finds the element or runs out of documents.
    pub fn sweep(mut self) -> Option<Scope> {
        loop {
            match self.step() {
                SearchState::Found(scope) => return Some(scope),
                SearchState::Exhausted => return None,
                _ => {}
            }
        }
    }

    fn next_embedded(&self, i: usize) -> SearchState {
        if i < self.embedded {
            SearchState::SearchingEmbedded(i)
        } else {
            SearchState::Exhausted
        }
    }

    fn present(&self, scope: Scope) -> bool {
        match self.surface.count(scope, self.locator) {
            Ok(n) => n > 0,
            Err(e) => {
                trace!("skipping {} while looking for {}: {}", scope, self.locator, e);
                false
            }
        }
    }
}

/// Element lookup and clicking on a surface, with the sub-document search and
/// the native-then-synthetic click fallback.
#[derive(Clone, Copy)]
pub struct Finder<'a> {
    surface: &'a dyn Surface,
    clock: &'a dyn Clock,
    window: Duration,
    sweep_pause: Duration,
    menu_pause: Duration,
}

impl<'a> Finder<'a> {
    pub fn new(
        surface: &'a dyn Surface,
        clock: &'a dyn Clock,
        window: Duration,
        sweep_pause: Duration,
        menu_pause: Duration,
    ) -> Self {
        Finder {
            surface,
            clock,
            window,
            sweep_pause,
            menu_pause,
        }
    }

    pub fn find(&self, locator: &Locator) -> Result<ElementRef, SurfaceError> {
        self.find_within(locator, self.window)
    }

    /// Sweeps all documents until `locator` matches or `window` expires.
    pub fn find_within(
        &self,
        locator: &Locator,
        window: Duration,
    ) -> Result<ElementRef, SurfaceError> {
        let deadline = self.clock.now() + window;
        loop {
            if let Some(scope) = SubDocumentSearch::new(self.surface, locator).sweep() {
                return Ok(ElementRef {
                    scope,
                    locator: locator.clone(),
                    index: 0,
                });
            }
            let now = self.clock.now();
            if now >= deadline {
                return Err(SurfaceError::NotFound(locator.clone()));
            }
            self.clock.sleep(self.sweep_pause.min(deadline - now));
        }
    }

    pub fn click(&self, locator: &Locator) -> Result<ElementRef, SurfaceError> {
        self.click_within(locator, self.window)
    }

    pub fn click_within(
        &self,
        locator: &Locator,
        window: Duration,
    ) -> Result<ElementRef, SurfaceError> {
        let element = self.find_within(locator, window)?;
        self.click_element(&element)?;
        Ok(element)
    }

    /// Native click first; a freshly revealed element under an overlay can
    /// refuse it, in which case the click is dispatched from script.
    pub fn click_element(&self, element: &ElementRef) -> Result<(), SurfaceError> {
        let native = self
            .surface
            .scroll_into_view(element)
            .and_then(|_| self.surface.native_click(element));
        if let Err(e) = native {
            debug!(
                "native click on {} in {} failed ({}), dispatching it from script",
                element.locator, element.scope, e
            );
            self.surface.synthetic_click(element)?;
        }
        Ok(())
    }

    /// Gives a menu opened by the previous click time to render.
    pub fn menu_pause(&self) {
        self.clock.sleep(self.menu_pause);
    }
}
