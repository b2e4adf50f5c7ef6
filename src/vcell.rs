use core::cell::UnsafeCell;

/// Volatile cell, for state shared with the panic handler.
#[repr(transparent)]
pub struct VCell<T>(UnsafeCell<T>);

// There is one thread of control and no interrupt handler.
unsafe impl<T: Send> Sync for VCell<T> {}

impl<T: Copy> VCell<T> {
    #[inline(always)]
    pub const fn new(v: T) -> Self {Self(UnsafeCell::new(v))}

    #[inline(always)]
    pub fn read(&self) -> T {
        unsafe {core::ptr::read_volatile(self.0.get())}
    }

    #[inline(always)]
    pub fn write(&self, v: T) {
        unsafe {core::ptr::write_volatile(self.0.get(), v)}
    }
}

#[test]
fn read_back() {
    let c = VCell::new(false);
    assert!(!c.read());
    c.write(true);
    assert!(c.read());
}
