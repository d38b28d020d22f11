use ash::vk;

/// Errors raised inside the loader. Converted to a `vk::Result` at the
/// exported ABI boundary.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("out of host memory")]
    OutOfHostMemory,

    #[error("out of device memory")]
    OutOfDeviceMemory,

    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    #[error("layer not present: {0}")]
    LayerNotPresent(String),

    #[error("extension not present: {0}")]
    ExtensionNotPresent(String),

    #[error("incompatible driver: {0}")]
    IncompatibleDriver(String),

    #[error("swapchain is out of date")]
    OutOfDate,

    #[error("driver returned {0:?}")]
    Driver(vk::Result),

    #[error("native window error: {0}")]
    Window(#[from] WindowError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LoaderError {
    /// The Vulkan result code reported to the application for this error.
    pub fn as_vk_result(&self) -> vk::Result {
        match self {
            LoaderError::OutOfHostMemory => vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            LoaderError::OutOfDeviceMemory => vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            LoaderError::LayerNotPresent(_) => vk::Result::ERROR_LAYER_NOT_PRESENT,
            LoaderError::ExtensionNotPresent(_) => vk::Result::ERROR_EXTENSION_NOT_PRESENT,
            LoaderError::IncompatibleDriver(_) => vk::Result::ERROR_INCOMPATIBLE_DRIVER,
            LoaderError::OutOfDate => vk::Result::ERROR_OUT_OF_DATE_KHR,
            LoaderError::Driver(result) => *result,
            LoaderError::InitializationFailed(_)
            | LoaderError::Window(_)
            | LoaderError::Config(_)
            | LoaderError::Io(_) => vk::Result::ERROR_INITIALIZATION_FAILED,
        }
    }
}

impl From<vk::Result> for LoaderError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => LoaderError::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => LoaderError::OutOfDeviceMemory,
            vk::Result::ERROR_OUT_OF_DATE_KHR => LoaderError::OutOfDate,
            other => LoaderError::Driver(other),
        }
    }
}

impl From<LoaderError> for vk::Result {
    fn from(err: LoaderError) -> Self {
        err.as_vk_result()
    }
}

/// A failed native-window operation, carrying the negative errno-style
/// status returned by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("producer status {code}")]
pub struct WindowError {
    pub code: i32,
}

impl WindowError {
    /// Status (-EINVAL) returned by `connect` when the window already has a
    /// producer.
    pub const ALREADY_CONNECTED: i32 = -22;

    pub fn new(code: i32) -> Self {
        Self { code }
    }

    pub fn is_already_connected(&self) -> bool {
        self.code == Self::ALREADY_CONNECTED
    }
}
