pub use sdds_file::*;
pub use {
    sdds_dtype as dtype, sdds_error as error, sdds_file as file, sdds_io as io,
    sdds_mask as mask,
};
