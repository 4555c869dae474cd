use std::path::PathBuf;

fn exe() -> PathBuf {
    option_env!("CARGO_BIN_EXE_gif-overlay")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let mut p = PathBuf::from("target").join("debug");
            p.push(if cfg!(windows) {
                "gif-overlay.exe"
            } else {
                "gif-overlay"
            });
            p
        })
}

fn write_sample_gif(path: &std::path::Path) {
    let mut out = Vec::new();
    {
        let mut enc = gif::Encoder::new(&mut out, 64, 32, &[]).unwrap();
        enc.set_repeat(gif::Repeat::Infinite).unwrap();
        for delay in [4u16, 8] {
            let mut px = [240u8, 240, 240, 255].repeat(64 * 32);
            let mut f = gif::Frame::from_rgba_speed(64, 32, &mut px, 10);
            f.delay = delay;
            enc.write_frame(&f).unwrap();
        }
    }
    std::fs::write(path, out).unwrap();
}

#[test]
fn cli_overlay_fails_cleanly_on_non_gif_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.gif");
    let output = dir.path().join("out.gif");
    std::fs::write(&input, b"not a gif").unwrap();

    let status = std::process::Command::new(exe())
        .args(["overlay", "--text", "hi", "--in"])
        .arg(&input)
        .arg("--out")
        .arg(&output)
        .status()
        .unwrap();

    assert!(!status.success());
    assert!(!output.exists());
}

#[test]
fn cli_overlay_writes_gif() {
    if gif_overlay::ResolvedFont::resolve(&gif_overlay::FontSettings::default()).is_err() {
        eprintln!("no font face installed; skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.gif");
    let output = dir.path().join("out.gif");
    write_sample_gif(&input);

    let out = std::process::Command::new(exe())
        .args([
            "overlay", "--text", "cli", "--x", "32", "--y", "16", "--angle", "-15", "--in",
        ])
        .arg(&input)
        .arg("--out")
        .arg(&output)
        .output()
        .unwrap();

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["frames"], 2);

    let frames = gif_overlay::extract_frames(&output).unwrap();
    assert_eq!(frames.iter().map(|f| f.delay_cs).collect::<Vec<_>>(), vec![4, 8]);
}
