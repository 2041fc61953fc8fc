//! One GRIB2 message: a single field with its grid, product and packing.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Grib2Error, Grib2Result};
use crate::sections::grid::parse_grid_definition;
use crate::sections::product::parse_product_definition;
use crate::sections::{
    parse_bitmap, parse_data_representation, parse_data_section, parse_identification, parse_indicator,
    write_bitmap, write_data_section, write_indicator, GridDefinition, Identification, ProductDefinition,
};
use crate::unpacking::{pack_simple, unpack_simple, PackedField};

#[derive(Debug, Clone, PartialEq)]
pub struct Grib2Message {
    pub discipline: u8,
    pub identification: Identification,
    pub grid: GridDefinition,
    pub product: ProductDefinition,
    pub packed: PackedField,
}

impl Grib2Message {
    /// Decode the sections of one message (from "GRIB" to "7777").
    pub fn parse(data: &[u8]) -> Grib2Result<Self> {
        let indicator = parse_indicator(data)?;
        if (indicator.message_length as usize) > data.len() {
            return Err(Grib2Error::InvalidFormat(format!(
                "message announces {} bytes, {} available",
                indicator.message_length,
                data.len()
            )));
        }
        let data = &data[..indicator.message_length as usize];
        if !data.ends_with(b"7777") {
            return Err(Grib2Error::InvalidFormat("missing end marker 7777".to_string()));
        }

        let identification = parse_identification(data)?;
        let grid = parse_grid_definition(data)?;
        let product = parse_product_definition(data)?;
        let representation = parse_data_representation(data)?;
        let bitmap = parse_bitmap(data)?.map(|b| b.data.to_vec());
        let section7 = parse_data_section(data)?;

        debug!(
            discipline = indicator.discipline,
            category = product.parameter_category,
            number = product.parameter_number,
            grid_template = grid.template_number(),
            product_template = product.template_number(),
            "Parsed GRIB2 message"
        );
        Ok(Self {
            discipline: indicator.discipline,
            identification,
            grid,
            product,
            packed: PackedField {
                representation,
                bitmap,
                data: section7.data.to_vec(),
            },
        })
    }

    /// Build a message by packing `values`; non-finite values are missing.
    pub fn from_values(
        discipline: u8,
        identification: Identification,
        grid: GridDefinition,
        product: ProductDefinition,
        values: &[f64],
        bits_per_value: u8,
        decimal_scale_factor: i16,
    ) -> Grib2Result<Self> {
        if values.len() != grid.num_data_points as usize {
            return Err(Grib2Error::EncodingError(format!(
                "{} values for a grid of {} points",
                values.len(),
                grid.num_data_points
            )));
        }
        Ok(Self {
            discipline,
            identification,
            grid,
            product,
            packed: pack_simple(values, bits_per_value, decimal_scale_factor)?,
        })
    }

    /// Grid point values, NaN where the bitmap flags a missing value.
    pub fn values(&self) -> Grib2Result<Vec<f64>> {
        unpack_simple(
            &self.packed.representation,
            &self.packed.data,
            self.packed.bitmap.as_deref(),
            self.grid.num_data_points as usize,
        )
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.identification.reference_time
    }

    /// Reference time plus forecast time.
    pub fn validity_time(&self) -> DateTime<Utc> {
        self.identification.reference_time + self.product.forecast_time
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_indicator(&mut buf, self.discipline, 0);
        self.identification.write(&mut buf);
        self.grid.write(&mut buf);
        self.product.write(&mut buf);
        self.packed.representation.write(&mut buf);
        write_bitmap(&mut buf, self.packed.bitmap.as_deref());
        write_data_section(&mut buf, &self.packed.data);
        buf.extend_from_slice(b"7777");
        let length = buf.len() as u64;
        buf[8..16].copy_from_slice(&length.to_be_bytes());
        buf
    }
}
