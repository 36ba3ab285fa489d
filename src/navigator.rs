use crate::{
    surface::{Finder, Locator, SurfaceError},
    types::{ExportError, Variant},
};

pub const DIRECT_EXPORT_BUTTON: &str = "//button[@id='exportMenuBtn'] | //button[contains(@title,'Export') or contains(@aria-label,'Export') or contains(@aria-label,'Exportar')]";

pub const OVERFLOW_BUTTON: &str = "//button[contains(@aria-label,'Mais opções') or contains(@aria-label,'More options') or contains(@title,'Mais opções') or contains(@title,'More options')]";

pub const OVERFLOW_PDF_ITEM: &str = "//button[.//span[contains(text(),'Exportar para PDF') or contains(text(),'Export to PDF')]] | //div[.//span[contains(text(),'Exportar para PDF') or contains(text(),'Export to PDF')]]//button | //li[.//span[contains(text(),'Exportar para PDF') or contains(text(),'Export to PDF')]]";

pub const FILE_MENU_BUTTON: &str = "//button[contains(@aria-label,'Arquivo') or contains(@aria-label,'File') or contains(@title,'Arquivo') or contains(@title,'File')]";

pub const FILE_EXPORT_ITEM: &str = "//button[.//span[contains(text(),'Exportar') or contains(text(),'Export')]] | //div[.//span[contains(text(),'Exportar') or contains(text(),'Export')]]//button";

pub const FILE_PDF_ITEM: &str =
    "//button[.//span[contains(text(),'PDF')]] | //div[.//span[contains(text(),'PDF')]]//button";

/// One way of reaching the export action.
pub trait ExportPath {
    fn variant(&self) -> Variant;
    fn attempt(&self, finder: &Finder, report: &str) -> Result<(), SurfaceError>;
}

/// Export button sitting on the toolbar.
pub struct DirectButton;

impl ExportPath for DirectButton {
    fn variant(&self) -> Variant {
        Variant::Direct
    }

    fn attempt(&self, finder: &Finder, report: &str) -> Result<(), SurfaceError> {
        info!("[{}] looking for the direct export button", report);
        finder.click(&Locator::xpath(DIRECT_EXPORT_BUTTON))?;
        Ok(())
    }
}

/// "More options" overflow menu, then its "Export to PDF" entry.
pub struct OverflowMenu;

impl ExportPath for OverflowMenu {
    fn variant(&self) -> Variant {
        Variant::OverflowMenu
    }

    fn attempt(&self, finder: &Finder, report: &str) -> Result<(), SurfaceError> {
        info!("[{}] trying the overflow menu", report);
        finder.click(&Locator::xpath(OVERFLOW_BUTTON))?;
        finder.menu_pause();
        finder.click(&Locator::xpath(OVERFLOW_PDF_ITEM))?;
        Ok(())
    }
}

/// File menu, Export submenu, PDF item.
pub struct FileMenu;

impl ExportPath for FileMenu {
    fn variant(&self) -> Variant {
        Variant::FileMenu
    }

    fn attempt(&self, finder: &Finder, report: &str) -> Result<(), SurfaceError> {
        info!("[{}] trying File > Export > PDF", report);
        finder.click(&Locator::xpath(FILE_MENU_BUTTON))?;
        finder.menu_pause();
        finder.click(&Locator::xpath(FILE_EXPORT_ITEM))?;
        finder.menu_pause();
        finder.click(&Locator::xpath(FILE_PDF_ITEM))?;
        Ok(())
    }
}

pub fn default_paths() -> Vec<Box<dyn ExportPath>> {
    vec![
        Box::new(DirectButton),
        Box::new(OverflowMenu),
        Box::new(FileMenu),
    ]
}

pub struct MenuNavigator<'a> {
    finder: Finder<'a>,
    paths: Vec<Box<dyn ExportPath>>,
}

impl<'a> MenuNavigator<'a> {
    pub fn new(finder: Finder<'a>) -> Self {
        Self::with_paths(finder, default_paths())
    }

    pub fn with_paths(finder: Finder<'a>, paths: Vec<Box<dyn ExportPath>>) -> Self {
        MenuNavigator { finder, paths }
    }

    /// Tries every path in order and returns the variant of the first one
    /// that reached the export action.
    pub fn open_export_action(&self, report: &str) -> Result<Variant, ExportError> {
        for path in &self.paths {
            match path.attempt(&self.finder, report) {
                Ok(()) => {
                    info!("[{}] export action reached ({})", report, path.variant());
                    return Ok(path.variant());
                }
                Err(e) => {
                    info!("[{}] {} path unavailable: {}", report, path.variant(), e);
                }
            }
        }
        Err(ExportError::Navigation {
            report: report.into(),
        })
    }
}
