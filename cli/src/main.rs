use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::debug;

use jvmcore_runtime::class::{Class, FieldSlot};
use jvmcore_runtime::config::VmConfig;
use jvmcore_runtime::descriptor::JavaType;
use jvmcore_runtime::keys::MethodKey;
use jvmcore_runtime::value::{ClassInstance, NativePayload, Value};
use jvmcore_runtime::vm::Vm;
use jvmcore_runtime::{class_loader, JvmError};

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    #[arg(
        short = 'c',
        long = "classpath",
        visible_alias = "cp",
        visible_alias = "class-path",
        value_delimiter = ';',
        help = "Directories to search for classes, in order, after the working directory; use ';' as separator"
    )]
    class_path: Vec<String>,
    #[arg(help = "Main class, as a package-qualified name (com.example.Main or com/example/Main)")]
    main_class_path: String,
}

/// Turns a package-qualified or slash-qualified main class name into the
/// relative `.class` file path the loader looks for.
fn class_file_relative_path(main_class: &str) -> PathBuf {
    let mut path = PathBuf::from(main_class.replace('.', "/"));
    path.set_extension("class");
    path
}

/// Resolves a main class name to the `.class` file to read: the working
/// directory is tried first, then each classpath entry in order, first
/// match wins.
fn resolve_class_file(main_class: &str, classpath: &[String]) -> Option<PathBuf> {
    let relative = class_file_relative_path(main_class);
    let candidate = Path::new(".").join(&relative);
    if candidate.is_file() {
        return Some(candidate);
    }
    for dir in classpath {
        let candidate = Path::new(dir).join(&relative);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Registers the built-in `java/io/PrintStream` and `java/lang/System`
/// classes the launcher is expected to seed before execution begins: a
/// `PrintStream` instance carrying the host's stdout, and a `System` class
/// whose static `out` field already holds it.
///
/// Printing through that instance is out of scope (`invokevirtual` is
/// unimplemented), but the field is resolvable by `getstatic` the moment a
/// loaded class references `System.out`.
fn register_builtins(vm: &Vm) {
    let print_stream_name = vm.interner.get_or_intern("java/io/PrintStream");
    let print_stream_class = Class {
        name: print_stream_name,
        super_class: None,
        constant_pool: Vec::new(),
        methods: Default::default(),
        fields: Default::default(),
        static_descriptors: Vec::new(),
        static_values: Mutex::new(Vec::new()),
        instance_descriptors: Vec::new(),
    };
    let print_stream_id = vm.register_builtin_class(print_stream_name, print_stream_class);

    let stdout = Value::ClassInstance(Arc::new(ClassInstance {
        class: print_stream_id,
        fields: Mutex::new(Vec::new()),
        native: Some(NativePayload::Stdout),
    }));

    let out_name = vm.interner.get_or_intern("out");
    let system_name = vm.interner.get_or_intern("java/lang/System");
    let mut system_fields = std::collections::HashMap::new();
    system_fields.insert(
        out_name,
        FieldSlot {
            descriptor: JavaType::Reference("java/io/PrintStream".to_string()),
            is_static: true,
            slot_index: 0,
        },
    );
    let system_class = Class {
        name: system_name,
        super_class: None,
        constant_pool: Vec::new(),
        methods: Default::default(),
        fields: system_fields,
        static_descriptors: vec![JavaType::Reference("java/io/PrintStream".to_string())],
        static_values: Mutex::new(vec![stdout]),
        instance_descriptors: Vec::new(),
    };
    vm.register_builtin_class(system_name, system_class);
}

fn run(args: Args) -> Result<(), String> {
    let main_class_path = args.main_class_path.replace('.', "/");

    let class_path = if args.class_path.is_empty() {
        let current_dir = std::env::current_dir()
            .map(|v| v.to_string_lossy().to_string())
            .map_err(|e| format!("cannot read current directory: {e}"))?;
        vec![current_dir]
    } else {
        args.class_path
    };

    let file_path = resolve_class_file(&main_class_path, &class_path)
        .ok_or_else(|| format!("class not found on classpath: {main_class_path}"))?;

    let bytes = std::fs::read(&file_path).map_err(|e| format!("cannot read {}: {e}", file_path.display()))?;
    let class_file = jvmcore_classfile::parse(&bytes).map_err(|e| format!("{e}"))?;

    let vm = Arc::new(Vm::new(VmConfig::new(class_path)));
    register_builtins(&vm);

    let class_id = class_loader::load_class(&vm, &class_file).map_err(|e| e.to_string())?;

    let main_descriptor = vm.interner.get_or_intern("([Ljava/lang/String;)V");
    let main_name = vm.interner.get_or_intern("main");
    let main_key = MethodKey { name: main_name, descriptor: main_descriptor };
    let main_method_id = vm
        .lookup_method(class_id, &main_key)
        .ok_or_else(|| JvmError::MainMethodNotFound(main_class_path.clone()).to_string())?;

    let method = vm.method(main_method_id);
    let mut locals = vec![None; method.max_locals as usize];
    if !locals.is_empty() {
        locals[0] = Some(Value::Null("[Ljava/lang/String;"));
    }

    vm.start_thread(main_method_id, locals);
    vm.wait_for_completion().map_err(|e| e.to_string())
}

fn main() {
    #[cfg(feature = "log-runtime-traces")]
    tracing_subscriber::fmt::try_init().ok();
    let args = Args::parse();
    debug!("provided command line arguments: {:?}", args);

    if let Err(e) = run(args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_main_class_becomes_class_file_path() {
        assert_eq!(class_file_relative_path("com/example/Main"), PathBuf::from("com/example/Main.class"));
    }

    #[test]
    fn resolves_from_working_directory_before_classpath() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Main.class"), b"cwd").unwrap();
        let cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let found = resolve_class_file("Main", &[]);
        std::env::set_current_dir(cwd).unwrap();
        assert_eq!(found, Some(PathBuf::from("./Main.class")));
    }

    #[test]
    fn falls_back_to_first_matching_classpath_entry() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("Main.class"), b"second").unwrap();

        let classpath = vec![
            first.path().to_string_lossy().to_string(),
            second.path().to_string_lossy().to_string(),
        ];
        let found = resolve_class_file("Main", &classpath);
        assert_eq!(found, Some(second.path().join("Main.class")));
    }

    #[test]
    fn missing_class_resolves_to_none() {
        let dir = tempfile::tempdir().unwrap();
        let classpath = vec![dir.path().to_string_lossy().to_string()];
        assert_eq!(resolve_class_file("Nowhere", &classpath), None);
    }
}
