use std::ffi::c_void;

use windows::Win32::{
    Foundation::MAX_PATH,
    UI::WindowsAndMessaging::{
        SystemParametersInfoW, SPIF_SENDCHANGE, SPIF_UPDATEINIFILE, SPI_GETDESKWALLPAPER,
        SPI_SETDESKWALLPAPER, SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS,
    },
};

use crate::{
    debug,
    errors::{HostError, Result},
    state_store::DesktopBackground,
    utility::{from_wide_nul, to_wstring},
    DEBUG_NAME,
};

/// Desktop background of the primary display through `SystemParametersInfoW`.
///
/// Windows reports a plain file path; it is handed around unchanged.
#[derive(Debug, Default)]
pub struct SystemBackground;

impl DesktopBackground for SystemBackground {
    fn current(&self) -> Result<Option<String>> {
        let mut buffer = [0u16; MAX_PATH as usize];
        unsafe {
            SystemParametersInfoW(
                SPI_GETDESKWALLPAPER,
                buffer.len() as u32,
                Some(buffer.as_mut_ptr() as *mut c_void),
                SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
            )
        }
        .map_err(|e| HostError::Platform(format!("SPI_GETDESKWALLPAPER failed: {e:?}")))?;

        let path = from_wide_nul(&buffer);
        debug!("[{}][BACKGROUND] OS reports '{}'", DEBUG_NAME, path);
        Ok((!path.trim().is_empty()).then_some(path))
    }

    fn set(&self, url: &str) -> Result<()> {
        let mut wide = to_wstring(url);
        unsafe {
            SystemParametersInfoW(
                SPI_SETDESKWALLPAPER,
                0,
                Some(wide.as_mut_ptr() as *mut c_void),
                SPIF_UPDATEINIFILE | SPIF_SENDCHANGE,
            )
        }
        .map_err(|e| HostError::Platform(format!("SPI_SETDESKWALLPAPER failed for '{url}': {e:?}")))
    }
}
