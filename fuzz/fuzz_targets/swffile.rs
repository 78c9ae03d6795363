#![no_main]

use libfuzzer_sys::fuzz_target;
use swfscope::{assembly::Code, SwfFile};

fuzz_target!(|data: &[u8]| {
    let Ok(swf) = SwfFile::from_mem(data.to_vec()) else {
        return;
    };
    for abc in swf.abc_files() {
        for body in &abc.bodies {
            if let Ok(code) = Code::decode(&body.code) {
                let _ = code.encode();
            }
        }
    }
    let _ = swf.to_bytes();
});
