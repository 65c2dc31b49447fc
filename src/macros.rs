macro_rules! debug_log {
    ($category:ident: $($arg:tt)*) => {
        if cfg!(feature = "debug-logs") {
            eprintln!("[{}] {}", stringify!($category), format_args!($($arg)*));
        }
    };
}

// The readability protocol is one algorithm with two awaiters: the sync
// surface calls the blocking refill, the async surface awaits it. The
// bodies below are expanded into both shapes so they cannot drift apart.

macro_rules! readable_slow_body {
    ($this:ident, $refill:ident $($aw:tt)*) => {{
        if $this.take_next_span() {
            return Ok(true);
        }
        match $this.$refill(1) $($aw)* {
            None => Ok(false),
            Some(refilled) => {
                let produced = refilled?;
                if $this.eof_reached() {
                    $this.disconnect_source();
                }
                if produced > 0 {
                    Ok($this.take_next_span())
                } else {
                    Ok(false)
                }
            }
        }
    }};
}

macro_rules! readable_n_body {
    ($this:ident, $n:ident, $refill:ident $($aw:tt)*) => {{
        if $this.span.is_empty() {
            let _ = $this.take_next_span();
        }
        let mut runway = $this.total_unconsumed_bytes();
        while runway < $n {
            match $this.$refill($n - runway) $($aw)* {
                None => break,
                Some(refilled) => {
                    let produced = refilled?;
                    runway += produced;
                    if $this.eof_reached() {
                        $this.disconnect_source();
                        break;
                    }
                    if produced == 0 {
                        break;
                    }
                }
            }
        }
        if $this.span.is_empty() {
            let _ = $this.take_next_span();
        }
        Ok(runway >= $n)
    }};
}

macro_rules! read_into_ex_body {
    ($this:ident, $dst:ident, $direct:ident $($aw:tt)*) => {{
        let mut filled = 0usize;
        loop {
            let take = $this.span.len().min($dst.len() - filled);
            if take > 0 {
                let start = $this.span.start;
                $dst[filled..filled + take].copy_from_slice(&$this.chunk()[start..start + take]);
                $this.span.start += take;
                filled += take;
            }
            if filled == $dst.len() || !$this.take_next_span() {
                break;
            }
        }
        while filled < $dst.len() {
            match $this.$direct(&mut $dst[filled..]) $($aw)* {
                None => break,
                Some(produced) => {
                    let produced = produced?;
                    $this.span_end_pos += produced as u64;
                    filled += produced;
                    if $this.eof_reached() {
                        $this.disconnect_source();
                        break;
                    }
                    if produced == 0 {
                        break;
                    }
                }
            }
        }
        Ok(filled)
    }};
}
