// firmware/abboot-firmware/src/main.rs
//! QEMU virt 上的 A/B 二级引导程序
#![cfg_attr(target_os = "none", no_std, no_main)]

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "aarch64", target_os = "none"))] {
        mod board;
        mod console;

        use core::panic::PanicInfo;

        use abboot::boot;
        use abboot::platform::VirtPlatform;
        use abboot::{Arena, QueueMemory, VirtioBlk, VirtioMmio};

        unsafe extern "C" {
            static mut __heap_start: u8;
            static mut __heap_end: u8;
        }

        /// 启动汇编跳过来，`dtb` 是 QEMU 放在 x0 里的设备树地址
        #[unsafe(no_mangle)]
        extern "C" fn rom_main(dtb: usize) -> ! {
            let config = board::boot_config();
            // SAFETY: board.toml 里的串口地址，这里是唯一的初始化点
            unsafe { console::init(&board::uart(), board::log_level()) };

            // SAFETY: 整个程序只有这一个平台实例（panic 处理除外，它不会返回）
            let mut platform = unsafe { VirtPlatform::new() };
            let Some(queue) = QueueMemory::take() else {
                boot::terminate(&mut platform, "virtqueue memory already taken");
            };
            // SAFETY: board.toml 里的 virtio-mmio 窗口，只有这一个实例
            let regs = unsafe { VirtioMmio::new(config.virtio_base) };
            let mut blk = VirtioBlk::new(regs, queue);

            // SAFETY: 链接脚本给出的堆区，之后没有别人使用
            let mut arena = unsafe {
                let start = &raw mut __heap_start;
                let end = &raw mut __heap_end;
                Arena::from_raw(start, end as usize - start as usize)
            };
            // SAFETY: 内核装载区是 RAM 中固件不使用的部分
            let load_region = unsafe {
                core::slice::from_raw_parts_mut(
                    config.kernel_load_addr as *mut u8,
                    config.load_region_size(),
                )
            };

            // SAFETY: QEMU 把设备树放在 RAM 开头，不与装载区重叠
            unsafe {
                boot::run(&mut platform, &config, &mut blk, &mut arena, load_region, dtb as *const u8)
            }
        }

        #[panic_handler]
        fn panic(info: &PanicInfo) -> ! {
            // SAFETY: terminate 不会返回，原来的实例不会再被使用
            let mut platform = unsafe { VirtPlatform::new() };
            boot::terminate(&mut platform, info)
        }
    } else {
        fn main() {
            println!("{} must be built for aarch64-unknown-none", env!("CARGO_PKG_NAME"));
        }
    }
}
