/// Questions a workflow may need answered mid-run.
pub trait Decider: Send + Sync {
    /// Replace the UEFI boot loader shipped in the source image? `None` means no answer.
    fn ask_replace_uefi_bootloader(&self) -> Option<bool>;
}

/// Closures answer directly.
impl<F> Decider for F
where
    F: Fn() -> Option<bool> + Send + Sync,
{
    fn ask_replace_uefi_bootloader(&self) -> Option<bool> {
        self()
    }
}

/// Never answers, so every question falls back to its safe default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAnswer;

impl Decider for NoAnswer {
    fn ask_replace_uefi_bootloader(&self) -> Option<bool> {
        None
    }
}

/// Unanswered questions keep what the image already has.
pub fn replace_uefi_bootloader(decider: &dyn Decider) -> bool {
    decider.ask_replace_uefi_bootloader().unwrap_or(false)
}
