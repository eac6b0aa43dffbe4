// firmware/abboot-firmware/src/console.rs
//! PL011 串口和 `log` 后端

use core::fmt::Write;
use core::ptr::NonNull;

use arm_pl011_uart::{
    DataBits, LineConfig, PL011Registers, Parity, StopBits, Uart, UniqueMmioPointer,
};
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

struct Console(Uart<'static>);

// SAFETY: 单核、无中断，串口只通过 CONSOLE 的锁访问
unsafe impl Send for Console {}

static CONSOLE: Mutex<Option<Console>> = Mutex::new(None);
static LOGGER: Logger = Logger;

/// 串口参数
pub struct UartConfig {
    pub base: usize,
    pub clock: u32,
    pub baud: u32,
}

/// 初始化串口并安装日志后端
///
/// # Safety
///
/// `uart.base` 必须是 PL011 的寄存器窗口，且只在这里初始化一次。
pub unsafe fn init(uart: &UartConfig, level: LevelFilter) {
    if let Some(ptr) = NonNull::new(uart.base as *mut PL011Registers) {
        // SAFETY: 由调用者保证
        let mut pl011 = Uart::new(unsafe { UniqueMmioPointer::new(ptr) });
        let line = LineConfig {
            data_bits: DataBits::Bits8,
            parity: Parity::None,
            stop_bits: StopBits::One,
        };
        // QEMU 的 PL011 不开也能输出，失败就保持复位状态
        let _ = pl011.enable(line, uart.baud, uart.clock);
        *CONSOLE.lock() = Some(Console(pl011));
    }
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

struct Logger;

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(console) = CONSOLE.lock().as_mut() {
            let _ = write!(console.0, "[{}] {}\r\n", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}
