/// VM-wide configuration assembled by the launcher from its CLI arguments.
/// No environment-variable configuration surface, per the engine's external
/// interface contract.
#[derive(Debug, Clone, Default)]
pub struct VmConfig {
    /// Directories searched, in order, for a class named on the command
    /// line that isn't found relative to the working directory.
    pub classpath: Vec<String>,
}

impl VmConfig {
    pub fn new(classpath: Vec<String>) -> Self {
        VmConfig { classpath }
    }
}
