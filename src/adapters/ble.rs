//! BLE pinpad GATT adapter.
//!
//! Implements [`BlePort`], the outbound half of the radio boundary, and
//! bridges the inbound half (connect, disconnect, characteristic write)
//! from Bluedroid callbacks to the main loop through a bounded queue.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT server via `esp_idf_svc::sys`.
//! - **all other targets**: simulation that records outbound operations.
//!
//! ## GATT Service Layout
//!
//! | Characteristic | UUID                          | Props        |
//! |----------------|-------------------------------|--------------|
//! | Service        | `909e937a-…-0242ac120000`     |              |
//! | Status         | `909e937a-…-0242ac120001`     | Read+Notify  |
//! | RPC            | `909e937a-…-0242ac120002`     | Write        |
//! | Security mode  | `909e937a-…-0242ac120003`     | Read         |
//! | HOTP counter   | `909e937a-…-0242ac120004`     | Read         |
//! | User id        | `909e937a-…-0242ac120005`     | Write        |
//! | Command        | `909e937a-…-0242ac120006`     | Write        |
//! | User commands  | `909e937a-…-0242ac120007`     | Read+Notify  |
//! | Time           | `909e937a-…-0242ac120008`     | Write        |

use core::fmt;
use log::{debug, info, warn};
use std::sync::Mutex;

use crate::app::ports::{BlePort, Characteristic, ConnId};
use crate::events::{push_event, Event};

// ───────────────────────────────────────────────────────────────
// Constants
// ───────────────────────────────────────────────────────────────

pub const SERVICE_UUID: u128 = 0x909e937a_e826_11ee_bd3d_0242ac120000;
pub const CHAR_STATUS: u128 = 0x909e937a_e826_11ee_bd3d_0242ac120001;
pub const CHAR_RPC: u128 = 0x909e937a_e826_11ee_bd3d_0242ac120002;
pub const CHAR_SECURITY_MODE: u128 = 0x909e937a_e826_11ee_bd3d_0242ac120003;
pub const CHAR_HOTP_COUNTER: u128 = 0x909e937a_e826_11ee_bd3d_0242ac120004;
pub const CHAR_USER_ID: u128 = 0x909e937a_e826_11ee_bd3d_0242ac120005;
pub const CHAR_CMD: u128 = 0x909e937a_e826_11ee_bd3d_0242ac120006;
pub const CHAR_USER_COMMANDS: u128 = 0x909e937a_e826_11ee_bd3d_0242ac120007;
pub const CHAR_TIME: u128 = 0x909e937a_e826_11ee_bd3d_0242ac120008;

const CHAR_COUNT: usize = Characteristic::ALL.len();

/// One byte more than the parser accepts, so over-long writes still
/// surface as `TooLong` instead of being silently cut to a valid length.
pub const MAX_WRITE_LEN: usize = 256;

/// Largest value held for a readable characteristic.
pub const MAX_VALUE_LEN: usize = 256;

const INBOUND_QUEUE_CAP: usize = 16;

/// Requested ATT MTU; large enough for a full write in one PDU.
#[cfg(target_os = "espidf")]
const LOCAL_MTU: u16 = 517;

#[cfg(target_os = "espidf")]
const NO_CONN: u32 = u32::MAX;

pub fn uuid_for(characteristic: Characteristic) -> u128 {
    match characteristic {
        Characteristic::Status => CHAR_STATUS,
        Characteristic::Rpc => CHAR_RPC,
        Characteristic::SecurityMode => CHAR_SECURITY_MODE,
        Characteristic::HotpCounter => CHAR_HOTP_COUNTER,
        Characteristic::UserId => CHAR_USER_ID,
        Characteristic::Cmd => CHAR_CMD,
        Characteristic::UserCommands => CHAR_USER_COMMANDS,
        Characteristic::Time => CHAR_TIME,
    }
}

/// Whether clients can subscribe to `characteristic`.
pub fn notifies(characteristic: Characteristic) -> bool {
    matches!(
        characteristic,
        Characteristic::Status | Characteristic::UserCommands
    )
}

fn slot(characteristic: Characteristic) -> usize {
    Characteristic::ALL
        .iter()
        .position(|c| *c == characteristic)
        .unwrap_or(0)
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleError {
    ControllerInit(i32),
    ControllerEnable(i32),
    BluedroidInit(i32),
    BluedroidEnable(i32),
    RegistrationTimeout,
}

impl fmt::Display for BleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControllerInit(rc) => write!(f, "bt_controller_init failed ({})", rc),
            Self::ControllerEnable(rc) => write!(f, "bt_controller_enable failed ({})", rc),
            Self::BluedroidInit(rc) => write!(f, "bluedroid_init failed ({})", rc),
            Self::BluedroidEnable(rc) => write!(f, "bluedroid_enable failed ({})", rc),
            Self::RegistrationTimeout => write!(f, "GATT service registration timed out"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Inbound queue (Bluedroid task → main loop)
// ───────────────────────────────────────────────────────────────

/// A BLE callback captured for the main loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BleInbound {
    Connected(ConnId),
    Disconnected(ConnId),
    Write {
        conn: ConnId,
        characteristic: Characteristic,
        data: heapless::Vec<u8, MAX_WRITE_LEN>,
    },
}

// GATTS callbacks run in the Bluedroid task (not ISR), so std Mutex is safe.
static INBOUND: Mutex<heapless::Deque<BleInbound, INBOUND_QUEUE_CAP>> =
    Mutex::new(heapless::Deque::new());

/// Queue a callback and wake the main loop.
/// Returns `false` when the queue is full and the callback was dropped.
pub fn queue_inbound(inbound: BleInbound) -> bool {
    let queued = match INBOUND.lock() {
        Ok(mut queue) => queue.push_back(inbound).is_ok(),
        Err(_) => false,
    };
    if queued {
        push_event(Event::BleInbound);
    } else {
        warn!("BLE: inbound queue full, callback dropped");
    }
    queued
}

/// Next captured callback, FIFO.
pub fn take_inbound() -> Option<BleInbound> {
    INBOUND.lock().ok().and_then(|mut queue| queue.pop_front())
}

/// Hand every queued callback to `handler`, FIFO.
///
/// Polls the queue itself, so a callback is delivered even when its
/// [`Event::BleInbound`] wake-up was lost in the event ring.
pub fn drain_inbound(mut handler: impl FnMut(BleInbound)) {
    while let Some(inbound) = take_inbound() {
        handler(inbound);
    }
}

/// Copy a client write, truncating anything past [`MAX_WRITE_LEN`].
pub fn write_payload(raw: &[u8]) -> heapless::Vec<u8, MAX_WRITE_LEN> {
    let mut data = heapless::Vec::new();
    let n = raw.len().min(MAX_WRITE_LEN);
    // Cannot fail: n is bounded by the capacity.
    let _ = data.extend_from_slice(&raw[..n]);
    data
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF Bluedroid glue
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures. These atomics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering};

#[cfg(target_os = "espidf")]
static BLE_GATTS_IF: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_CONN_ID: AtomicU32 = AtomicU32::new(NO_CONN);
#[cfg(target_os = "espidf")]
static BLE_SVC_HANDLE: AtomicU32 = AtomicU32::new(0);
/// Index into `Characteristic::ALL` of the characteristic being registered.
#[cfg(target_os = "espidf")]
static BLE_CHAR_STEP: AtomicU32 = AtomicU32::new(0);
#[cfg(target_os = "espidf")]
static BLE_REGISTERED: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static BLE_ADV_DATA_READY: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static BLE_ADV_WANTED: AtomicBool = AtomicBool::new(false);
#[cfg(target_os = "espidf")]
static CHAR_HANDLES: [AtomicU32; CHAR_COUNT] = [const { AtomicU32::new(0) }; CHAR_COUNT];

/// Prepared (long) write being reassembled: (conn, characteristic, bytes).
#[cfg(target_os = "espidf")]
static PREP_WRITE: Mutex<Option<(ConnId, Characteristic, heapless::Vec<u8, MAX_WRITE_LEN>)>> =
    Mutex::new(None);

#[cfg(target_os = "espidf")]
fn uuid128_to_esp(uuid: u128) -> esp_idf_svc::sys::esp_bt_uuid_t {
    let mut t: esp_idf_svc::sys::esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    t.len = 16;
    unsafe {
        t.uuid.uuid128 = uuid.to_le_bytes();
    }
    t
}

#[cfg(target_os = "espidf")]
fn adv_params() -> esp_idf_svc::sys::esp_ble_adv_params_t {
    use esp_idf_svc::sys::*;
    esp_ble_adv_params_t {
        adv_int_min: 0x20,
        adv_int_max: 0x40,
        adv_type: esp_ble_adv_type_t_ADV_TYPE_IND,
        own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
        channel_map: esp_ble_adv_channel_t_ADV_CHNL_ALL,
        adv_filter_policy: esp_ble_adv_filter_t_ADV_FILTER_ALLOW_SCAN_ANY_CON_ANY,
        ..unsafe { core::mem::zeroed() }
    }
}

#[cfg(target_os = "espidf")]
fn characteristic_for_handle(handle: u16) -> Option<Characteristic> {
    Characteristic::ALL
        .iter()
        .zip(CHAR_HANDLES.iter())
        .find(|(_, h)| h.load(AtomicOrdering::Relaxed) == u32::from(handle))
        .map(|(c, _)| *c)
}

#[cfg(target_os = "espidf")]
fn handle_for(characteristic: Characteristic) -> u16 {
    CHAR_HANDLES[slot(characteristic)].load(AtomicOrdering::Relaxed) as u16
}

#[cfg(target_os = "espidf")]
unsafe fn add_gatt_char(svc_handle: u16, characteristic: Characteristic) {
    use esp_idf_svc::sys::*;
    let (perm, prop) = if characteristic.is_writable() {
        (ESP_GATT_PERM_WRITE, ESP_GATT_CHAR_PROP_BIT_WRITE)
    } else if notifies(characteristic) {
        (
            ESP_GATT_PERM_READ,
            ESP_GATT_CHAR_PROP_BIT_READ | ESP_GATT_CHAR_PROP_BIT_NOTIFY,
        )
    } else {
        (ESP_GATT_PERM_READ, ESP_GATT_CHAR_PROP_BIT_READ)
    };
    let mut char_uuid = uuid128_to_esp(uuid_for(characteristic));
    let mut initial = [0u8; 1];
    let mut value = esp_attr_value_t {
        attr_max_len: MAX_VALUE_LEN as u16,
        attr_len: 0,
        attr_value: initial.as_mut_ptr(),
    };
    let mut control = esp_attr_control_t {
        auto_rsp: ESP_GATT_AUTO_RSP as u8,
    };
    let rc = unsafe {
        esp_ble_gatts_add_char(
            svc_handle,
            &mut char_uuid,
            perm as esp_gatt_perm_t,
            prop as esp_gatt_char_prop_t,
            &mut value,
            &mut control,
        )
    };
    if rc != ESP_OK as esp_err_t {
        log::error!("BLE GATTS: add_char {:?} failed ({})", characteristic, rc);
    }
}

/// Client characteristic configuration descriptor for notify characteristics.
#[cfg(target_os = "espidf")]
unsafe fn add_cccd(svc_handle: u16) {
    use esp_idf_svc::sys::*;
    let mut uuid: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
    uuid.len = 2;
    uuid.uuid.uuid16 = 0x2902;
    let mut initial = [0u8; 2];
    let mut value = esp_attr_value_t {
        attr_max_len: 2,
        attr_len: 2,
        attr_value: initial.as_mut_ptr(),
    };
    let mut control = esp_attr_control_t {
        auto_rsp: ESP_GATT_AUTO_RSP as u8,
    };
    unsafe {
        esp_ble_gatts_add_char_descr(
            svc_handle,
            &mut uuid,
            (ESP_GATT_PERM_READ | ESP_GATT_PERM_WRITE) as esp_gatt_perm_t,
            &mut value,
            &mut control,
        );
    }
}

/// Move to the next characteristic, or finish registration.
#[cfg(target_os = "espidf")]
unsafe fn register_next(svc_handle: u16) {
    let next = BLE_CHAR_STEP.fetch_add(1, AtomicOrdering::Relaxed) as usize + 1;
    match Characteristic::ALL.get(next) {
        Some(c) => unsafe { add_gatt_char(svc_handle, *c) },
        None => {
            BLE_REGISTERED.store(true, AtomicOrdering::Release);
            log::info!("BLE GATTS: all characteristics registered");
        }
    }
}

#[cfg(target_os = "espidf")]
unsafe fn start_gap_advertising() {
    let mut params = adv_params();
    unsafe {
        esp_idf_svc::sys::esp_ble_gap_start_advertising(&mut params);
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gap_event_handler(
    event: esp_idf_svc::sys::esp_gap_ble_cb_event_t,
    param: *mut esp_idf_svc::sys::esp_ble_gap_cb_param_t,
) {
    use esp_idf_svc::sys::*;
    match event {
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_DATA_SET_COMPLETE_EVT => {
            BLE_ADV_DATA_READY.store(true, AtomicOrdering::Release);
            if BLE_ADV_WANTED.load(AtomicOrdering::Acquire) {
                unsafe { start_gap_advertising() };
            }
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_START_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising started");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_ADV_STOP_COMPLETE_EVT => {
            log::info!("BLE GAP: advertising stopped");
        }
        esp_gap_ble_cb_event_t_ESP_GAP_BLE_SEC_REQ_EVT => unsafe {
            esp_ble_gap_security_rsp((*param).ble_security.ble_req.bd_addr.as_mut_ptr(), true);
        },
        _ => {}
    }
}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn ble_gatts_event_handler(
    event: esp_idf_svc::sys::esp_gatts_cb_event_t,
    gatts_if: esp_idf_svc::sys::esp_gatt_if_t,
    param: *mut esp_idf_svc::sys::esp_ble_gatts_cb_param_t,
) {
    use esp_idf_svc::sys::*;

    BLE_GATTS_IF.store(gatts_if as u32, AtomicOrdering::Relaxed);

    match event {
        esp_gatts_cb_event_t_ESP_GATTS_REG_EVT => {
            log::info!("BLE GATTS: app registered (if={})", gatts_if);
            let mut svc_id = esp_gatt_srvc_id_t {
                id: esp_gatt_id_t {
                    uuid: uuid128_to_esp(SERVICE_UUID),
                    inst_id: 0,
                },
                is_primary: true,
            };
            // 1 service + 8 declarations/values + 2 descriptors, with headroom.
            unsafe { esp_ble_gatts_create_service(gatts_if, &mut svc_id, 20) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CREATE_EVT => {
            let svc_handle = unsafe { (*param).create.service_handle };
            BLE_SVC_HANDLE.store(u32::from(svc_handle), AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: service created (handle={})", svc_handle);
            unsafe {
                esp_ble_gatts_start_service(svc_handle);
                BLE_CHAR_STEP.store(0, AtomicOrdering::Relaxed);
                add_gatt_char(svc_handle, Characteristic::ALL[0]);
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_EVT => {
            let handle = unsafe { (*param).add_char.attr_handle };
            let step = BLE_CHAR_STEP.load(AtomicOrdering::Relaxed) as usize;
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
            let Some(characteristic) = Characteristic::ALL.get(step).copied() else {
                return;
            };
            CHAR_HANDLES[step].store(u32::from(handle), AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: {:?} char (handle={})", characteristic, handle);
            if notifies(characteristic) {
                unsafe { add_cccd(svc_handle) };
            } else {
                unsafe { register_next(svc_handle) };
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_ADD_CHAR_DESCR_EVT => {
            let svc_handle = BLE_SVC_HANDLE.load(AtomicOrdering::Relaxed) as u16;
            unsafe { register_next(svc_handle) };
        }
        esp_gatts_cb_event_t_ESP_GATTS_CONNECT_EVT => {
            let conn = unsafe { (*param).connect.conn_id };
            BLE_CONN_ID.store(u32::from(conn), AtomicOrdering::Relaxed);
            log::info!("BLE GATTS: client connected (conn_id={})", conn);
            queue_inbound(BleInbound::Connected(conn));
        }
        esp_gatts_cb_event_t_ESP_GATTS_DISCONNECT_EVT => {
            let conn = unsafe { (*param).disconnect.conn_id };
            let _ = BLE_CONN_ID.compare_exchange(
                u32::from(conn),
                NO_CONN,
                AtomicOrdering::Relaxed,
                AtomicOrdering::Relaxed,
            );
            log::info!("BLE GATTS: client disconnected (conn_id={})", conn);
            queue_inbound(BleInbound::Disconnected(conn));
        }
        esp_gatts_cb_event_t_ESP_GATTS_WRITE_EVT => {
            let p = unsafe { &(*param).write };
            let Some(characteristic) = characteristic_for_handle(p.handle) else {
                // CCCD writes land here; the stack answers them.
                return;
            };
            if !characteristic.is_writable() {
                return;
            }
            let data = unsafe { core::slice::from_raw_parts(p.value, p.len as usize) };
            if p.is_prep {
                if let Ok(mut prep) = PREP_WRITE.lock() {
                    let entry = prep.get_or_insert_with(|| {
                        (p.conn_id, characteristic, heapless::Vec::new())
                    });
                    let room = MAX_WRITE_LEN - entry.2.len();
                    let _ = entry.2.extend_from_slice(&data[..data.len().min(room)]);
                }
                return;
            }
            queue_inbound(BleInbound::Write {
                conn: p.conn_id,
                characteristic,
                data: write_payload(data),
            });
        }
        esp_gatts_cb_event_t_ESP_GATTS_EXEC_WRITE_EVT => {
            let p = unsafe { &(*param).exec_write };
            let pending = PREP_WRITE.lock().ok().and_then(|mut prep| prep.take());
            let execute = p.exec_write_flag as u32 == ESP_GATT_PREP_WRITE_EXEC;
            if let (Some((conn, characteristic, data)), true) = (pending, execute) {
                queue_inbound(BleInbound::Write {
                    conn,
                    characteristic,
                    data,
                });
            }
        }
        esp_gatts_cb_event_t_ESP_GATTS_MTU_EVT => {
            log::debug!("BLE GATTS: mtu={}", unsafe { (*param).mtu.mtu });
        }
        _ => {}
    }
}

// ───────────────────────────────────────────────────────────────
// BLE adapter
// ───────────────────────────────────────────────────────────────

/// Outbound operation recorded by the simulation.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimOp {
    StartAdvertising,
    StopAdvertising,
    Disconnect(ConnId),
    Notify(Characteristic, Vec<u8>),
}

pub struct BleAdapter {
    device_name: heapless::String<24>,
    values: [heapless::Vec<u8, MAX_VALUE_LEN>; CHAR_COUNT],
    advertising: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_ops: Vec<SimOp>,
}

impl BleAdapter {
    pub fn new(device_name: heapless::String<24>) -> Self {
        Self {
            device_name,
            values: Default::default(),
            advertising: false,
            #[cfg(not(target_os = "espidf"))]
            sim_ops: Vec::new(),
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    /// Last value published for `characteristic`.
    pub fn value(&self, characteristic: Characteristic) -> &[u8] {
        &self.values[slot(characteristic)]
    }

    /// Bring up the stack and register the pinpad service.
    ///
    /// Blocks until every characteristic has a handle, so values published
    /// right after `init` reach the attribute table. Advertising stays off
    /// until [`BlePort::start_advertising`].
    pub fn init(&mut self) -> Result<(), BleError> {
        self.platform_init()?;
        info!("BLE: service {:032x} ready as '{}'", SERVICE_UUID, self.device_name);
        Ok(())
    }

    /// Operations recorded so far (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_ops(&self) -> &[SimOp] {
        &self.sim_ops
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn take_sim_ops(&mut self) -> Vec<SimOp> {
        core::mem::take(&mut self.sim_ops)
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_init(&mut self) -> Result<(), BleError> {
        use esp_idf_svc::sys::*;
        unsafe {
            // Release classic BT memory (BLE-only mode saves ~30 KB).
            esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT);

            let mut bt_cfg = esp_bt_controller_config_t::default();
            let ret = esp_bt_controller_init(&mut bt_cfg);
            if ret != ESP_OK as esp_err_t {
                return Err(BleError::ControllerInit(ret));
            }
            let ret = esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE);
            if ret != ESP_OK as esp_err_t {
                return Err(BleError::ControllerEnable(ret));
            }
            let ret = esp_bluedroid_init();
            if ret != ESP_OK as esp_err_t {
                return Err(BleError::BluedroidInit(ret));
            }
            let ret = esp_bluedroid_enable();
            if ret != ESP_OK as esp_err_t {
                return Err(BleError::BluedroidEnable(ret));
            }

            esp_ble_gap_register_callback(Some(ble_gap_event_handler));
            esp_ble_gatts_register_callback(Some(ble_gatts_event_handler));
            esp_ble_gatts_app_register(0);
            esp_ble_gatt_set_local_mtu(LOCAL_MTU);

            // Device name must be NUL-terminated for the C API.
            let mut name = [0u8; 25];
            let bytes = self.device_name.as_bytes();
            name[..bytes.len()].copy_from_slice(bytes);
            esp_ble_gap_set_device_name(name.as_ptr() as *const _);

            let mut adv_data = esp_ble_adv_data_t {
                set_scan_rsp: false,
                include_name: true,
                include_txpower: false,
                flag: (ESP_BLE_ADV_FLAG_GEN_DISC | ESP_BLE_ADV_FLAG_BREDR_NOT_SPT) as u8,
                ..core::mem::zeroed()
            };
            esp_ble_gap_config_adv_data(&mut adv_data);
        }

        // Registration completes in the Bluedroid task.
        for _ in 0..200 {
            if BLE_REGISTERED.load(AtomicOrdering::Acquire) {
                return Ok(());
            }
            esp_idf_svc::hal::delay::FreeRtos::delay_ms(10);
        }
        Err(BleError::RegistrationTimeout)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_init(&mut self) -> Result<(), BleError> {
        info!("BLE(sim): stack up");
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_start_advertising(&mut self) {
        BLE_ADV_WANTED.store(true, AtomicOrdering::Release);
        if BLE_ADV_DATA_READY.load(AtomicOrdering::Acquire) {
            unsafe { start_gap_advertising() };
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start_advertising(&mut self) {
        self.sim_ops.push(SimOp::StartAdvertising);
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop_advertising(&mut self) {
        BLE_ADV_WANTED.store(false, AtomicOrdering::Release);
        unsafe {
            esp_idf_svc::sys::esp_ble_gap_stop_advertising();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop_advertising(&mut self) {
        self.sim_ops.push(SimOp::StopAdvertising);
    }

    #[cfg(target_os = "espidf")]
    fn platform_disconnect(&mut self, conn: ConnId) {
        unsafe {
            esp_idf_svc::sys::esp_ble_gatts_close(
                BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as u8,
                conn,
            );
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_disconnect(&mut self, conn: ConnId) {
        self.sim_ops.push(SimOp::Disconnect(conn));
    }

    #[cfg(target_os = "espidf")]
    fn platform_set_value(&mut self, characteristic: Characteristic) {
        use esp_idf_svc::sys::*;
        let handle = handle_for(characteristic);
        if handle == 0 {
            return;
        }
        let value = &self.values[slot(characteristic)];
        let rc = unsafe { esp_ble_gatts_set_attr_value(handle, value.len() as u16, value.as_ptr()) };
        if rc != ESP_OK as esp_err_t {
            warn!("BLE: set_attr_value {:?} failed ({})", characteristic, rc);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set_value(&mut self, _characteristic: Characteristic) {}

    #[cfg(target_os = "espidf")]
    fn platform_notify(&mut self, characteristic: Characteristic) {
        let handle = handle_for(characteristic);
        let conn = BLE_CONN_ID.load(AtomicOrdering::Relaxed);
        if handle == 0 || conn == NO_CONN {
            return;
        }
        let value = &mut self.values[slot(characteristic)];
        unsafe {
            esp_idf_svc::sys::esp_ble_gatts_send_indicate(
                BLE_GATTS_IF.load(AtomicOrdering::Relaxed) as u8,
                conn as u16,
                handle,
                value.len() as u16,
                value.as_mut_ptr(),
                false,
            );
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_notify(&mut self, characteristic: Characteristic) {
        let value = self.values[slot(characteristic)].to_vec();
        self.sim_ops.push(SimOp::Notify(characteristic, value));
    }

    fn store_value(&mut self, characteristic: Characteristic, value: &[u8]) {
        let stored = &mut self.values[slot(characteristic)];
        stored.clear();
        let n = value.len().min(MAX_VALUE_LEN);
        if n < value.len() {
            warn!(
                "BLE: {:?} value truncated ({} > {})",
                characteristic,
                value.len(),
                MAX_VALUE_LEN
            );
        }
        let _ = stored.extend_from_slice(&value[..n]);
    }
}

// ───────────────────────────────────────────────────────────────
// BlePort implementation
// ───────────────────────────────────────────────────────────────

impl BlePort for BleAdapter {
    fn start_advertising(&mut self) {
        info!("BLE: advertising as '{}'", self.device_name);
        self.platform_start_advertising();
        self.advertising = true;
    }

    fn stop_advertising(&mut self) {
        self.platform_stop_advertising();
        self.advertising = false;
        info!("BLE: advertising stopped");
    }

    fn disconnect(&mut self, conn: ConnId) {
        info!("BLE: closing conn_id={}", conn);
        self.platform_disconnect(conn);
    }

    fn set_value(&mut self, characteristic: Characteristic, value: &[u8]) {
        self.store_value(characteristic, value);
        self.platform_set_value(characteristic);
    }

    fn notify(&mut self, characteristic: Characteristic, value: &[u8]) {
        if !notifies(characteristic) {
            debug!("BLE: {:?} has no notify property", characteristic);
            return;
        }
        self.store_value(characteristic, value);
        self.platform_notify(characteristic);
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
