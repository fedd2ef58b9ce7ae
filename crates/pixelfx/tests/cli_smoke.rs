use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use effects::{Package, EFFECT_MANIFEST, EFFECT_SOURCE};
use engine::PixelGrid;
use tempfile::TempDir;

struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        for dir in ["config", "data", "share"] {
            fs::create_dir_all(root.path().join(dir)).unwrap();
        }
        Self { root }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.path().join(name)
    }

    fn data_dir(&self) -> PathBuf {
        self.path("data")
    }

    fn pixelfx(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_pixelfx"))
            .current_dir(self.root.path())
            .env("PIXELFX_CONFIG_DIR", self.path("config"))
            .env("PIXELFX_DATA_DIR", self.path("data"))
            .env("PIXELFX_SHARE_DIR", self.path("share"))
            .env_remove("RUST_LOG")
            .args(args)
            .output()
            .expect("failed to run pixelfx")
    }

    fn write_effect(&self, id: &str, source: &str) {
        let dir = self.path("share/effects").join(id);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("effect.toml"), format!("name = \"{id}\"\nversion = \"1.0\"\n")).unwrap();
        fs::write(dir.join("effect.rhai"), source).unwrap();
    }
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn assert_success(output: &Output) {
    assert!(output.status.success(), "pixelfx failed: {}", stderr(output));
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn empty_effect_round_trips_an_image() {
    let sandbox = Sandbox::new();
    let input = sandbox.path("test.png");
    let output = sandbox.path("out.png");

    assert_success(&sandbox.pixelfx(&["save-test", "--out", arg(&input), "--size", "64"]));
    assert_success(&sandbox.pixelfx(&["make-empty", "--effect", "Blank"]));
    assert!(sandbox.data_dir().join("effects/blank/effect.toml").is_file());

    assert_success(&sandbox.pixelfx(&[
        "apply", "--effect", "blank", "--file", arg(&input), "--out", arg(&output), "--workers", "0",
    ]));
    assert_eq!(
        PixelGrid::open(&output).unwrap(),
        PixelGrid::open(&input).unwrap()
    );

    let again = sandbox.pixelfx(&["make-empty", "--effect", "blank"]);
    assert!(!again.status.success());
}

#[test]
fn apply_passes_params() {
    let sandbox = Sandbox::new();
    sandbox.write_effect("fill", "#{ r: level, g: level, b: level, a: 255 }");
    let input = sandbox.path("in.png");
    let output = sandbox.path("out.png");

    assert_success(&sandbox.pixelfx(&["save-test", "--out", arg(&input), "--size", "8"]));
    assert_success(&sandbox.pixelfx(&[
        "apply", "--effect", "fill", "--file", arg(&input), "--out", arg(&output), "--param",
        "level=300",
    ]));
    let grid = PixelGrid::open(&output).unwrap();
    assert!(grid.as_raw().chunks_exact(4).all(|p| p == [44, 44, 44, 255]));
}

#[test]
fn pack_and_shorthand_unpack() {
    let sandbox = Sandbox::new();
    sandbox.write_effect("invert", "#{ r: 255 - pixel.r, g: 255 - pixel.g, b: 255 - pixel.b, a: pixel.a }");

    assert_success(&sandbox.pixelfx(&["pack", "--effect", "invert"]));
    let package = sandbox.path("invert.fx.xpk");
    assert!(package.is_file());

    assert_success(&sandbox.pixelfx(&[arg(&package)]));
    let installed = sandbox.data_dir().join("effects/invert");
    assert!(installed.join("effect.toml").is_file());
    assert!(installed.join("effect.rhai").is_file());

    fs::write(sandbox.path("broken.fx.xpk"), b"not a zip archive").unwrap();
    let broken = sandbox.pixelfx(&["unpack-effect", "--file", arg(&sandbox.path("broken.fx.xpk"))]);
    assert!(!broken.status.success());
    assert!(stderr(&broken).contains("corrupt archive"));
}

#[test]
fn invalid_package_does_not_replace_installed_effect() {
    let sandbox = Sandbox::new();
    assert_success(&sandbox.pixelfx(&["make-empty", "--effect", "keep"]));
    let installed = sandbox.data_dir().join("effects/keep");
    let manifest = fs::read_to_string(installed.join("effect.toml")).unwrap();
    let source = fs::read_to_string(installed.join("effect.rhai")).unwrap();

    let files = [
        (EFFECT_MANIFEST.to_string(), b"name = \"\"\nversion = \"\"\n".to_vec()),
        (EFFECT_SOURCE.to_string(), b"pixel".to_vec()),
    ];
    let bytes = Package::new("keep", files.into_iter().collect()).encode().unwrap();
    let package = sandbox.path("keep.fx.xpk");
    fs::write(&package, bytes).unwrap();

    let result = sandbox.pixelfx(&["unpack-effect", "--file", arg(&package)]);
    assert!(!result.status.success());
    assert!(stderr(&result).contains("name must not be empty"), "{}", stderr(&result));

    assert_eq!(fs::read_to_string(installed.join("effect.toml")).unwrap(), manifest);
    assert_eq!(fs::read_to_string(installed.join("effect.rhai")).unwrap(), source);
    assert_success(&sandbox.pixelfx(&["about", "--effect", "keep"]));
}

#[test]
fn chain_applies_or_leaves_no_output() {
    let sandbox = Sandbox::new();
    sandbox.write_effect("invert", "#{ r: 255 - pixel.r, g: 255 - pixel.g, b: 255 - pixel.b, a: pixel.a }");
    let input = sandbox.path("in.png");
    assert_success(&sandbox.pixelfx(&["save-test", "--out", arg(&input), "--size", "16"]));

    let chain = sandbox.path("twice.xfc");
    fs::write(&chain, "# identity by double inversion\ninvert\ninvert\n").unwrap();
    let output = sandbox.path("twice.png");
    assert_success(&sandbox.pixelfx(&[arg(&chain), "--img", arg(&input), "--out", arg(&output)]));
    assert_eq!(
        PixelGrid::open(&output).unwrap(),
        PixelGrid::open(&input).unwrap()
    );

    let bad_chain = sandbox.path("bad.xfc");
    fs::write(&bad_chain, "invert\nmissing\n").unwrap();
    let bad_output = sandbox.path("bad.png");
    let result = sandbox.pixelfx(&[
        "apply-chain", "--file", arg(&bad_chain), "--img", arg(&input), "--out", arg(&bad_output),
    ]);
    assert!(!result.status.success());
    let message = stderr(&result);
    assert!(message.contains("error:"), "{message}");
    assert!(message.contains("unknown effect 'missing'"), "{message}");
    assert!(!bad_output.exists());
}

#[test]
fn timeout_cancels_endless_effects() {
    let sandbox = Sandbox::new();
    sandbox.write_effect("spin", "loop { } pixel");
    let input = sandbox.path("in.png");
    assert_success(&sandbox.pixelfx(&["save-test", "--out", arg(&input), "--size", "4"]));

    let result = sandbox.pixelfx(&[
        "apply", "--effect", "spin", "--file", arg(&input), "--out", arg(&sandbox.path("o.png")),
        "--timeout", "200ms",
    ]);
    assert!(!result.status.success());
    assert!(stderr(&result).contains("cancelled"), "{}", stderr(&result));
}

#[test]
fn about_json_describes_the_effect() {
    let sandbox = Sandbox::new();
    sandbox.write_effect("tint", "pixel");

    let output = sandbox.pixelfx(&["about", "--effect", "tint", "--json"]);
    assert_success(&output);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["kind"], "effect");
    assert_eq!(report["id"], "tint");
    assert_eq!(report["version"], "1.0");

    let missing = sandbox.pixelfx(&["about", "--lib", "nothing"]);
    assert!(!missing.status.success());
    assert!(stderr(&missing).contains("not found"));
}
