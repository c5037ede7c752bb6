use bolero::check;
use simpledb::page::Page;

const BLOCK_SIZE: usize = 400;

fn main() {
    check!().with_type().for_each(|input: &(u16, i32)| {
        let (raw_offset, value) = *input;
        let offset = (raw_offset as usize) % (BLOCK_SIZE - 4);

        let mut page = Page::new(BLOCK_SIZE);
        page.set_int(offset, value).expect("offset is in bounds");
        assert_eq!(page.get_int(offset).expect("just written"), value);
    });

    check!().with_type().for_each(|input: &(u16, Vec<u8>)| {
        let (raw_offset, bytes) = input;
        let max_string_len = BLOCK_SIZE / 4;
        let ascii: String = bytes
            .iter()
            .take(max_string_len)
            .map(|b| (b % 95 + 32) as u8 as char)
            .collect();

        if Page::max_length(ascii.len()) > BLOCK_SIZE {
            return;
        }
        let offset = (*raw_offset as usize) % (BLOCK_SIZE - Page::max_length(ascii.len()) - 1).max(1);

        let mut page = Page::new(BLOCK_SIZE);
        page.set_string(offset, &ascii).expect("offset is in bounds");
        assert_eq!(page.get_string(offset).expect("just written"), ascii);
    });
}
