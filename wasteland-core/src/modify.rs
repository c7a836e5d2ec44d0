use crate::decode::{
    carve_block, table_pointers, CarvedBlock, CodecError, MapInfo, Transition, MAP_INFO_LEN,
    TRANSITION_RECORD_LEN,
};
use crate::defs::{MapDimension, ACTION_TRANSITION};
use crate::msq::Block;

/// Re-encodes individual decoded fields back into a copy of a block. Only
/// the bytes of the replaced field are written; everything else is left as
/// read.
pub struct BlockModifier {
    block: Block,
    carved: CarvedBlock,
}

impl BlockModifier {
    pub fn new(block: Block, dim: MapDimension) -> Result<BlockModifier, CodecError> {
        let carved = carve_block(&block, dim)?;
        Ok(BlockModifier { block, carved })
    }

    pub fn replace_map_info(&mut self, info: &MapInfo) -> Result<(), CodecError> {
        let at = self.carved.offsets.map_info;
        let enc = &mut self.block.body.enc_section;
        if at + MAP_INFO_LEN > enc.len() {
            return Err(CodecError::OutOfRange {
                what: "map info",
                start: at,
                end: at + MAP_INFO_LEN,
                len: enc.len(),
            });
        }
        enc[at..at + MAP_INFO_LEN].copy_from_slice(&info.to_bytes());
        Ok(())
    }

    /// Overwrite the record behind transition `selector`. Returns whether any
    /// byte changed.
    pub fn replace_transition(
        &mut self,
        selector: usize,
        transition: &Transition,
    ) -> Result<bool, CodecError> {
        let pointers = self.transition_pointers()?;
        let ptr = *pointers
            .get(selector)
            .ok_or(CodecError::SelectorOutOfRange {
                table: "transition",
                selector,
                len: pointers.len(),
            })?;
        if ptr == 0 {
            return Err(CodecError::NullEntry {
                table: "transition",
                selector,
            });
        }

        let at = ptr as usize;
        let enc = &mut self.block.body.enc_section;
        let record = transition.to_bytes();
        let changed = enc[at..at + TRANSITION_RECORD_LEN] != record;
        enc[at..at + TRANSITION_RECORD_LEN].copy_from_slice(&record);
        Ok(changed)
    }

    /// Write every non-null entry of `table`. The table must have the same
    /// length as the block's; null entries are skipped. Returns how many
    /// records changed.
    pub fn replace_transitions(
        &mut self,
        table: &[Option<Transition>],
    ) -> Result<usize, CodecError> {
        let len = self.transition_pointers()?.len();
        if table.len() != len {
            return Err(CodecError::SelectorOutOfRange {
                table: "transition",
                selector: table.len().saturating_sub(1),
                len,
            });
        }

        let mut changed = 0;
        for (selector, entry) in table.iter().enumerate() {
            if let Some(t) = entry {
                if self.replace_transition(selector, t)? {
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    fn transition_pointers(&self) -> Result<Vec<u16>, CodecError> {
        match self.carved.action_table(ACTION_TRANSITION) {
            Some(off) => {
                let (start, end) = self.carved.region(off);
                let enc = self.block.enc_section();
                let pointers = table_pointers(enc, "transition table", start, end)?;
                // Records must fit before the end of the table region.
                for (index, &p) in pointers.iter().enumerate() {
                    if p != 0 && p as usize + TRANSITION_RECORD_LEN > end {
                        return Err(CodecError::BadPointer {
                            table: "transition table",
                            index,
                            pointer: p as usize,
                            start,
                            end,
                        });
                    }
                }
                Ok(pointers)
            }
            None => Ok(Vec::new()),
        }
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    pub fn into_block(self) -> Block {
        self.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_block;
    use crate::defs::Location;
    use crate::testkit::{MapBlockSpec, TRANSITION_TEST_DIM};

    fn sample() -> (Block, MapDimension) {
        let spec = MapBlockSpec::sample(TRANSITION_TEST_DIM, 5);
        (spec.build_block(0, 5), spec.dim)
    }

    #[test]
    fn unmodified_round_trip_is_byte_identical() {
        let (block, dim) = sample();
        let db = decode_block(&block, dim).unwrap();

        let mut m = BlockModifier::new(block.clone(), dim).unwrap();
        m.replace_map_info(&db.map_info).unwrap();
        assert_eq!(m.replace_transitions(&db.transitions).unwrap(), 0);
        assert_eq!(m.into_block(), block);
    }

    #[test]
    fn map_info_replacement_touches_only_map_info() {
        let (block, dim) = sample();
        let mut db = decode_block(&block, dim).unwrap();
        db.map_info.encounter_freq = 0;

        let mut m = BlockModifier::new(block.clone(), dim).unwrap();
        m.replace_map_info(&db.map_info).unwrap();
        let modified = m.into_block();

        let changed: Vec<usize> = block
            .enc_section()
            .iter()
            .zip(modified.enc_section())
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(i, _)| i)
            .collect();
        let carved = carve_block(&block, dim).unwrap();
        assert_eq!(changed, vec![carved.offsets.map_info + 1]);
        assert_eq!(modified.plain_section(), block.plain_section());

        let reread = decode_block(&modified, dim).unwrap();
        assert_eq!(reread, db);
    }

    #[test]
    fn transition_replacement_round_trips() {
        let (block, dim) = sample();
        let mut db = decode_block(&block, dim).unwrap();
        let mut t = db.transitions[2].clone().unwrap();
        t.location = Location(9);
        t.x = 17;
        db.transitions[2] = Some(t.clone());

        let mut m = BlockModifier::new(block, dim).unwrap();
        assert!(m.replace_transition(2, &t).unwrap());
        let reread = decode_block(m.block(), dim).unwrap();
        assert_eq!(reread, db);
    }

    #[test]
    fn null_and_missing_selectors_are_errors() {
        let (block, dim) = sample();
        let db = decode_block(&block, dim).unwrap();
        let t = db.transitions[0].clone().unwrap();

        let mut m = BlockModifier::new(block, dim).unwrap();
        assert_eq!(
            m.replace_transition(1, &t).unwrap_err(),
            CodecError::NullEntry {
                table: "transition",
                selector: 1
            }
        );
        assert!(matches!(
            m.replace_transition(40, &t).unwrap_err(),
            CodecError::SelectorOutOfRange { selector: 40, len: 4, .. }
        ));
    }
}
