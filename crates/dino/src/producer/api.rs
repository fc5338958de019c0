//! C ABI of the simulation module and symbol loading.

use libloading::os::unix::{Library, Symbol};
use tracing::error;

use crate::BridgeError;

pub type GameVoidFn = unsafe extern "C" fn();
pub type GameUpdateFn = unsafe extern "C" fn(f32);
pub type GameIntFn = unsafe extern "C" fn() -> i32;
pub type GameStateFn = unsafe extern "C" fn() -> *const f32;

/// State layout version this bridge understands (`GAME_STATE_ABI`).
pub const STATE_ABI_VERSION: u32 = 1;

/// Entry points exported by the module.
#[derive(Clone, Copy)]
pub struct GameApi {
    pub init: GameVoidFn,
    pub start: GameVoidFn,
    pub update: GameUpdateFn,
    pub jump: GameIntFn,
    pub restart: GameVoidFn,
    pub state_array: GameStateFn,
    pub is_playing: GameIntFn,
    pub is_game_over: GameIntFn,
    pub score: GameIntFn,
    pub high_score: GameIntFn,
    /// Optional `game_get_state_len`: readable cells behind the state pointer.
    pub state_len: Option<GameIntFn>,
    /// Optional `GAME_STATE_ABI` data symbol.
    pub abi_version: Option<u32>,
}

impl GameApi {
    /// Resolve all entry points.
    ///
    /// # Safety
    ///
    /// The symbols must have the signatures declared above.
    pub unsafe fn load(lib: &Library) -> Result<Self, BridgeError> {
        unsafe {
            let abi_version = load_data_symbol(lib, b"GAME_STATE_ABI");
            match abi_version {
                Some(version) if version != STATE_ABI_VERSION => {
                    error!(version, expected = STATE_ABI_VERSION, "state ABI mismatch");
                    return Err(BridgeError::Unsupported(format!(
                        "state ABI version {version}, expected {STATE_ABI_VERSION}"
                    )));
                }
                _ => {}
            }

            Ok(Self {
                init: load_symbol(lib, b"game_init", "game_init")?,
                start: load_symbol(lib, b"game_start", "game_start")?,
                update: load_symbol(lib, b"game_update", "game_update")?,
                jump: load_symbol(lib, b"game_jump", "game_jump")?,
                restart: load_symbol(lib, b"game_restart", "game_restart")?,
                state_array: load_symbol(lib, b"game_get_state_array", "game_get_state_array")?,
                is_playing: load_symbol(lib, b"game_is_playing", "game_is_playing")?,
                is_game_over: load_symbol(lib, b"game_is_game_over", "game_is_game_over")?,
                score: load_symbol(lib, b"game_get_score", "game_get_score")?,
                high_score: load_symbol(lib, b"game_get_high_score", "game_get_high_score")?,
                state_len: load_symbol(lib, b"game_get_state_len", "game_get_state_len").ok(),
                abi_version,
            })
        }
    }
}

unsafe fn load_symbol<T: Copy>(
    lib: &Library,
    symbol: &'static [u8],
    label: &'static str,
) -> Result<T, BridgeError> {
    unsafe {
        let sym: Symbol<T> = lib
            .get(symbol)
            .map_err(|e| BridgeError::SymbolNotFound(label.to_string(), e))?;
        Ok(*sym)
    }
}

unsafe fn load_data_symbol(lib: &Library, symbol: &'static [u8]) -> Option<u32> {
    unsafe {
        let sym: Symbol<*const u32> = lib.get(symbol).ok()?;
        Some(**sym)
    }
}
