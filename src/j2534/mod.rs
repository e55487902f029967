//! SAE J2534 pass-through devices. The vendor driver is a shared library loaded at runtime.
//!
//! A [`Device`] is opened once per library and shared by all channels on it. [`J2534Can`] exposes a raw
//! CAN channel, [`J2534IsoTp`] uses the driver's native ISO15765 implementation.

mod can;
pub mod error;
mod isotp;
pub mod types;

use std::ffi::{c_char, c_void, CStr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

pub use can::J2534Can;
pub use error::{Error, StatusCode};
pub use isotp::J2534IsoTp;
pub use types::PassThruMsg;

use types::{ConfigParameter, FilterType, IoctlId, Protocol, SConfig, SConfigList};

type PassThruOpen = unsafe extern "system" fn(*const c_void, *mut u32) -> i32;
type PassThruClose = unsafe extern "system" fn(u32) -> i32;
type PassThruConnect = unsafe extern "system" fn(u32, u32, u32, u32, *mut u32) -> i32;
type PassThruDisconnect = unsafe extern "system" fn(u32) -> i32;
type PassThruReadMsgs = unsafe extern "system" fn(u32, *mut PassThruMsg, *mut u32, u32) -> i32;
type PassThruWriteMsgs = unsafe extern "system" fn(u32, *const PassThruMsg, *mut u32, u32) -> i32;
type PassThruStartMsgFilter = unsafe extern "system" fn(
    u32,
    u32,
    *const PassThruMsg,
    *const PassThruMsg,
    *const PassThruMsg,
    *mut u32,
) -> i32;
type PassThruStopMsgFilter = unsafe extern "system" fn(u32, u32) -> i32;
type PassThruIoctl = unsafe extern "system" fn(u32, u32, *mut c_void, *mut c_void) -> i32;
type PassThruGetLastError = unsafe extern "system" fn(*mut c_char) -> i32;

const STATUS_NOERROR: i32 = 0;

/// A driver advertised in the registry under `PassThruSupport.04.04`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Driver {
    pub name: String,
    pub vendor: String,
    pub library: PathBuf,
}

/// List installed J2534 drivers. Always empty on platforms without a driver registry.
#[cfg(target_os = "windows")]
pub fn drivers() -> Vec<Driver> {
    use winreg::enums::HKEY_LOCAL_MACHINE;
    use winreg::RegKey;

    let hklm = RegKey::predef(HKEY_LOCAL_MACHINE);
    let mut drivers = vec![];

    for root in [
        "SOFTWARE\\PassThruSupport.04.04",
        "SOFTWARE\\WOW6432Node\\PassThruSupport.04.04",
    ] {
        let Ok(passthru) = hklm.open_subkey(root) else {
            continue;
        };

        for name in passthru.enum_keys().flatten() {
            let Ok(key) = passthru.open_subkey(&name) else {
                continue;
            };
            let library: String = match key.get_value("FunctionLibrary") {
                Ok(library) => library,
                Err(_) => continue,
            };
            let driver = Driver {
                name: key.get_value("Name").unwrap_or(name),
                vendor: key.get_value("Vendor").unwrap_or_default(),
                library: PathBuf::from(library),
            };
            if !drivers.contains(&driver) {
                drivers.push(driver);
            }
        }
    }

    drivers
}

#[cfg(not(target_os = "windows"))]
pub fn drivers() -> Vec<Driver> {
    vec![]
}

/// Entry points of a loaded PassThru library.
pub struct Interface {
    open: PassThruOpen,
    close: PassThruClose,
    connect: PassThruConnect,
    disconnect: PassThruDisconnect,
    read_msgs: PassThruReadMsgs,
    write_msgs: PassThruWriteMsgs,
    start_msg_filter: PassThruStartMsgFilter,
    stop_msg_filter: PassThruStopMsgFilter,
    ioctl: PassThruIoctl,
    get_last_error: PassThruGetLastError,
    // Keeps the function pointers above valid
    _library: libloading::Library,
}

fn symbol<T: Copy>(library: &libloading::Library, name: &'static str) -> Result<T, Error> {
    let mut raw = name.as_bytes().to_vec();
    raw.push(0);
    let symbol = unsafe { library.get::<T>(&raw) }.map_err(|_| Error::MissingSymbol(name))?;
    Ok(*symbol)
}

impl Interface {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let library =
            unsafe { libloading::Library::new(path) }.map_err(|e| Error::LoadFailed(e.to_string()))?;

        info!("Loaded J2534 library {}", path.display());
        Ok(Self {
            open: symbol(&library, "PassThruOpen")?,
            close: symbol(&library, "PassThruClose")?,
            connect: symbol(&library, "PassThruConnect")?,
            disconnect: symbol(&library, "PassThruDisconnect")?,
            read_msgs: symbol(&library, "PassThruReadMsgs")?,
            write_msgs: symbol(&library, "PassThruWriteMsgs")?,
            start_msg_filter: symbol(&library, "PassThruStartMsgFilter")?,
            stop_msg_filter: symbol(&library, "PassThruStopMsgFilter")?,
            ioctl: symbol(&library, "PassThruIoctl")?,
            get_last_error: symbol(&library, "PassThruGetLastError")?,
            _library: library,
        })
    }

    fn check(&self, status: i32) -> Result<(), Error> {
        if status == STATUS_NOERROR {
            return Ok(());
        }

        // The API guarantees at most 80 characters including the terminator
        let mut buf = [0 as c_char; 256];
        let message = unsafe {
            if (self.get_last_error)(buf.as_mut_ptr()) == STATUS_NOERROR {
                CStr::from_ptr(buf.as_ptr()).to_string_lossy().into_owned()
            } else {
                String::new()
            }
        };

        Err(Error::Status {
            code: status.into(),
            message,
        })
    }
}

/// An opened pass-through device. Closed when the last handle is dropped.
pub struct Device {
    interface: Interface,
    id: u32,
}

impl Device {
    /// Load `library` and open the first device it offers.
    pub fn open(library: impl AsRef<Path>) -> Result<Self, Error> {
        let interface = Interface::load(library)?;
        let mut id = 0;
        interface.check(unsafe { (interface.open)(std::ptr::null(), &mut id) })?;

        info!("Opened J2534 device {}", id);
        Ok(Self { interface, id })
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let _ = unsafe { (self.interface.close)(self.id) };
        debug!("Closed J2534 device {}", self.id);
    }
}

/// A connected protocol channel. Disconnected on drop.
pub struct Channel {
    device: Arc<Device>,
    id: u32,
    protocol: Protocol,
}

impl Channel {
    pub fn connect(device: Arc<Device>, protocol: Protocol, flags: u32, baudrate: u32) -> Result<Self, Error> {
        let mut id = 0;
        let api = &device.interface;
        api.check(unsafe { (api.connect)(device.id, protocol as u32, flags, baudrate, &mut id) })?;

        info!("Connected J2534 channel {} ({:?}, {} baud)", id, protocol, baudrate);
        Ok(Self { device, id, protocol })
    }

    fn api(&self) -> &Interface {
        &self.device.interface
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Read at most one message, waiting up to `timeout`. `None` if nothing arrived.
    pub fn read(&self, timeout: Duration) -> Result<Option<PassThruMsg>, Error> {
        let mut msg = PassThruMsg::default();
        let mut count = 1;
        let status = unsafe { (self.api().read_msgs)(self.id, &mut msg, &mut count, timeout.as_millis() as u32) };

        match self.api().check(status) {
            Ok(()) => {}
            Err(e) if matches!(e.status(), Some(StatusCode::Timeout | StatusCode::BufferEmpty)) => {}
            Err(e) => return Err(e),
        }

        Ok(if count == 0 { None } else { Some(msg) })
    }

    pub fn write(&self, msg: &PassThruMsg, timeout: Duration) -> Result<(), Error> {
        let mut count = 1;
        let api = self.api();
        api.check(unsafe { (api.write_msgs)(self.id, msg, &mut count, timeout.as_millis() as u32) })?;
        if count != 1 {
            return Err(Error::Status {
                code: StatusCode::Timeout,
                message: "message not transmitted".into(),
            });
        }
        Ok(())
    }

    pub fn start_filter(
        &self,
        filter_type: FilterType,
        mask: &PassThruMsg,
        pattern: &PassThruMsg,
        flow_control: Option<&PassThruMsg>,
    ) -> Result<u32, Error> {
        let mut filter_id = 0;
        let flow_control = flow_control.map_or(std::ptr::null(), |msg| msg as *const PassThruMsg);
        let api = self.api();
        api.check(unsafe {
            (api.start_msg_filter)(self.id, filter_type as u32, mask, pattern, flow_control, &mut filter_id)
        })?;
        Ok(filter_id)
    }

    pub fn stop_filter(&self, filter_id: u32) -> Result<(), Error> {
        let api = self.api();
        api.check(unsafe { (api.stop_msg_filter)(self.id, filter_id) })
    }

    fn ioctl(&self, ioctl: IoctlId, input: *mut c_void) -> Result<(), Error> {
        let api = self.api();
        api.check(unsafe { (api.ioctl)(self.id, ioctl as u32, input, std::ptr::null_mut()) })
    }

    pub fn set_config(&self, params: &[(ConfigParameter, u32)]) -> Result<(), Error> {
        let mut config: Vec<SConfig> = params
            .iter()
            .map(|&(parameter, value)| SConfig {
                parameter: parameter as u32,
                value,
            })
            .collect();
        let mut list = SConfigList {
            num_of_params: config.len() as u32,
            config: config.as_mut_ptr(),
        };
        self.ioctl(IoctlId::SetConfig, &mut list as *mut SConfigList as *mut c_void)
    }

    pub fn clear_rx_buffer(&self) -> Result<(), Error> {
        self.ioctl(IoctlId::ClearRxBuffer, std::ptr::null_mut())
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let api = self.api();
        let _ = unsafe { (api.disconnect)(self.id) };
        debug!("Disconnected J2534 channel {}", self.id);
    }
}
