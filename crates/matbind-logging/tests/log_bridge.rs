use matbind_logging::{init_logging, set_log_hook, BindingLogRecord, LoggingOptions};
use std::sync::Mutex;

static CAPTURED: Mutex<Vec<BindingLogRecord>> = Mutex::new(Vec::new());

#[test]
fn log_macros_reach_the_hook() {
    set_log_hook(|rec: &BindingLogRecord| {
        CAPTURED.lock().unwrap().push(rec.clone());
    });
    let _guard = init_logging(LoggingOptions {
        default_filter: "debug".to_string(),
    });

    log::debug!(target: "matbind_view::native", "destroying native matrix");

    let items = CAPTURED.lock().unwrap();
    let record = items
        .iter()
        .find(|r| r.message.contains("destroying native matrix"))
        .expect("bridged record");
    assert_eq!(record.target, "matbind_view::native");
    assert_eq!(record.level, "DEBUG");
}
