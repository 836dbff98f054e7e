/// Returns early with `$error` when `$predicate` does not hold.
///
/// ```ignore
/// ensure!(!self.is_upgraded(), WebSocketError::protocol("websocket connection already upgraded"));
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
