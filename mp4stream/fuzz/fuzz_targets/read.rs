#![no_main]

use libfuzzer_sys::fuzz_target;
use mp4stream::{Mp4Reader, ReadEvent};

fuzz_target!(|data: &[u8]| {
    // The first byte picks a chunk size so partial-box buffering gets exercised too.
    let Some((&chunk_len, data)) = data.split_first() else {
        return;
    };
    let chunk_len = usize::from(chunk_len).max(1);

    let mut whole_frames = 0usize;
    let mut reader = Mp4Reader::new();
    let whole = reader.read(data, |event| {
        if let ReadEvent::Frame(_) = event {
            whole_frames += 1;
        }
        true
    });

    let mut chunked_frames = 0usize;
    let mut reader = Mp4Reader::new();
    for chunk in data.chunks(chunk_len) {
        if let Err(_error) = reader.read(chunk, |event| {
            if let ReadEvent::Frame(_) = event {
                chunked_frames += 1;
            }
            true
        }) {
            #[cfg(fuzzing_repro)]
            eprintln!("chunked read returned an error: {_error}\n{_error:?}");
            break;
        }
    }

    if whole.is_ok() && reader.error_code() == 0 {
        assert_eq!(whole_frames, chunked_frames);
    }
});
