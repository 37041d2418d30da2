use std::{
    io::BufRead,
    panic::{catch_unwind, AssertUnwindSafe},
    thread,
};

use crate::{api::ApiCall, cmd::Cmd};

/// Reads API calls from `reader` on a background thread.
pub fn spawn(reader: impl BufRead + Send + 'static, send_cmd: impl Fn(Cmd) + Send + 'static) {
    thread::spawn(move || wrap(move || read_calls(reader, send_cmd)));
}

/// Runs the reader, reporting how it ended. Drawing carries on either way.
fn wrap(f: impl FnOnce() -> anyhow::Result<()>) {
    let res = catch_unwind(AssertUnwindSafe(f));
    match res {
        Ok(Ok(())) => log::info!("API input closed"),
        Ok(Err(e)) => log::error!("API input failed: {e}"),
        Err(_panic) => {
            // Panic message and backtrace are printed by the default panic hook.
            log::error!("API input thread panicked, no more API calls will be accepted");
        }
    }
}

/// Forwards every JSON line of `reader` that parses as an [`ApiCall`], until end of input.
///
/// Blank lines are skipped, malformed ones are logged and skipped.
fn read_calls(reader: impl BufRead, send_cmd: impl Fn(Cmd)) -> anyhow::Result<()> {
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<ApiCall>(line) {
            Ok(call) => {
                log::trace!("API call: {call:?}");
                send_cmd(Cmd::Api(call));
            }
            Err(e) => log::warn!("ignoring malformed API call on line {}: {e}", i + 1),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, io::Cursor};

    use super::*;

    fn read(input: &str) -> Vec<ApiCall> {
        let calls = RefCell::new(Vec::new());
        read_calls(Cursor::new(input.to_owned()), |cmd| match cmd {
            Cmd::Api(call) => calls.borrow_mut().push(call),
            other => panic!("unexpected {other:?}"),
        })
        .unwrap();
        calls.into_inner()
    }

    #[test]
    fn forwards_calls_in_order() {
        let calls = read(concat!(
            r#"{"createGraffitiLayer": {"layerId": "L1", "color": -1, "size": 10}}"#,
            "\n",
            r#"{"pushGraffitiPoint": {"layerId": "L1", "x": 0, "y": 0}}"#,
            "\n",
        ));
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], ApiCall::CreateLayer { color: -1, .. }));
        assert!(matches!(&calls[1], ApiCall::PushPoint { x, .. } if *x == 0.0));
    }

    #[test]
    fn skips_blank_and_malformed_lines() {
        let calls = read(concat!(
            "\n",
            "   \n",
            "not json\n",
            r#"{"deleteGraffitiLayer": {"layerId": "L1"}}"#,
            "\n",
            r#"{"pushGraffitiPoint": {"layerId": "L1", "x": 1}}"#,
            "\n",
            r#"  {"pushGraffitiPoint": {"layerId": "L1", "x": 1, "y": 2}}  "#,
        ));
        assert_eq!(
            calls,
            [ApiCall::PushPoint {
                layer_id: "L1".into(),
                x: 1.0,
                y: 2.0,
            }]
        );
    }
}
