//! Rule tables for the tag classifier.

/// Tags that always appear on a classified text
pub const BASE_TAG: &str = "v8";

/// Tags too generic to be useful
pub const EXCLUDED: &[&str] = &[
    "bug",
    "build",
    "chore",
    "ci",
    "cleanup",
    "clean-up",
    "cq",
    "deps",
    "doc",
    "docs",
    "fix",
    "fixes",
    "format",
    "infra",
    "merge",
    "misc",
    "nit",
    "owners",
    "presubmit",
    "refactor",
    "refactoring",
    "release",
    "reland",
    "revert",
    "roll",
    "style",
    "task",
    "test",
    "tests",
    "testing",
    "todo",
    "tools",
    "typo",
    "wip",
];

/// Substrings that mark a piece as noise rather than a tag
pub const EXCLUDED_SUBSTRINGS: &[&str] = &["step", "http", "crbug", "=", "#"];

/// Near-synonyms rewritten to one canonical spelling
pub const SYNONYMS: &[(&str, &str)] = &[
    ("wasm", "webassembly"),
    ("wasm-gc", "webassembly"),
    ("arraybuffer", "arraybuffers"),
    ("array-buffer", "arraybuffers"),
    ("typedarray", "typedarrays"),
    ("typed-array", "typedarrays"),
    ("typed-arrays", "typedarrays"),
    ("bigint", "bigints"),
    ("promise", "promises"),
    ("regex", "regexp"),
    ("irregexp", "regexp"),
    ("js", "javascript"),
    ("es", "javascript"),
    ("ecmascript", "javascript"),
    ("interpreter", "ignition"),
    ("turbo", "turbofan"),
    ("compiler", "turbofan"),
    ("baseline", "sparkplug"),
    ("gc", "heap"),
    ("oilpan", "cppgc"),
    ("devtools", "inspector"),
    ("debugger", "debug"),
    ("i18n", "intl"),
    ("parsing", "parser"),
    ("x86", "ia32"),
    ("amd64", "x64"),
    ("x86-64", "x64"),
    ("x86_64", "x64"),
    ("aarch64", "arm64"),
    ("win", "windows"),
    ("win32", "windows"),
    ("win64", "windows"),
    ("mac", "macos"),
    ("osx", "macos"),
    ("riscv64", "riscv"),
    ("rv64", "riscv"),
];

/// Ordered keyword scan: a substring of the lowercased text and its tag
pub const KEYWORDS: &[(&str, &str)] = &[
    ("maglev", "maglev"),
    ("turboshaft", "turboshaft"),
    ("turbofan", "turbofan"),
    ("sparkplug", "sparkplug"),
    ("ignition", "ignition"),
    ("liftoff", "liftoff"),
    ("webassembly", "webassembly"),
    ("wasm", "webassembly"),
    ("arraybuffer", "arraybuffers"),
    ("typedarray", "typedarrays"),
    ("bigint", "bigints"),
    ("regexp", "regexp"),
    ("promise", "promises"),
    ("cppgc", "cppgc"),
    ("oilpan", "cppgc"),
    ("inspector", "inspector"),
    ("arm64", "arm64"),
    ("riscv", "riscv"),
    ("loong64", "loong64"),
    ("s390", "s390"),
    ("windows", "windows"),
    ("android", "android"),
    ("fuchsia", "fuchsia"),
];
