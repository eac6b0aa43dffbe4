// 文件路径：./firmware/abboot-firmware/build.rs
use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=src/entry.S");
    println!("cargo:rerun-if-changed=link.ld");
    println!("cargo:rerun-if-changed=board.toml");

    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if arch != "aarch64" || os != "none" {
        return;
    }

    // 启动汇编编译成静态库，由链接脚本的 ENTRY(_start) 拉进来
    cc::Build::new().file("src/entry.S").compile("entry");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    println!("cargo:rustc-link-arg-bins=-T{}", manifest_dir.join("link.ld").display());
}
