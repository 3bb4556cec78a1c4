//! CPU exception dispatch (vectors 0-31). Grounded on the original's
//! `ExceptionHandler`/`init_dispatcher()`: handlers register themselves
//! against a vector number, and an unregistered exception is fatal.

use spin::Mutex;

pub trait ExceptionHandler: Sync {
    fn handle_exception(&self, vector: u8);
}

const SLOTS: usize = 32;

static HANDLERS: Mutex<[Option<&'static dyn ExceptionHandler>; SLOTS]> = Mutex::new([None; SLOTS]);

pub fn register_handler(vector: u8, handler: &'static dyn ExceptionHandler) {
    HANDLERS.lock()[vector as usize] = Some(handler);
}

pub fn dispatch(vector: u8) {
    let handler = HANDLERS.lock()[vector as usize];
    match handler {
        Some(h) => h.handle_exception(vector),
        None => panic!("unhandled CPU exception, vector {}", vector),
    }
}
