// 文件路径：./library/abboot/build.rs
use std::env;

fn main() {
    println!("cargo:rerun-if-changed=src/platform/jump.S");

    // 只有裸机 aarch64 目标才需要跳转汇编；主机上跑测试时跳过
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if arch != "aarch64" || os != "none" {
        return;
    }

    // 使用 `cc` crate 来编译汇编文件，cc 会输出链接静态库需要的指令
    cc::Build::new().file("src/platform/jump.S").compile("abboot_jump");
}
