// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 构建脚本: 静态链接 FFmpeg 时补齐 Windows 系统库
fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_env = std::env::var("CARGO_CFG_TARGET_ENV").unwrap_or_default();
    if target_os == "windows" && target_env == "msvc" {
        // dshow 摄像头采集依赖的 COM/OLE 与 VFW
        for lib in ["ole32", "oleaut32", "strmiids", "vfw32"] {
            println!("cargo:rustc-link-lib=dylib={}", lib);
        }

        // x264 / Secure Channel (TLS, 用于网络输入源)
        println!("cargo:rustc-link-lib=dylib=libx264");
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
